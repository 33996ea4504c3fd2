mod basics;
mod coins;
mod jobs;

pub use basics::Basics;
pub use coins::Coins;
pub use jobs::Jobs;
