//! # Hype Core
//!
//! Protocol-independent building blocks shared by every Hype crate.
//!
//! - **Channels**: the [`Channel`] trait chat backends implement, and the
//!   identities that travel with every message ([`ChannelId`], [`Room`],
//!   [`User`], [`Destination`]).
//! - **Messages**: what handlers send back ([`Reply`], [`Outbound`],
//!   [`Content`], [`Embed`]).
//! - **Name completion**: [`NameIndex`], resolving partial and aliased
//!   tokens to canonical names with deterministic tie-breaking.
//! - **Storage**: the key/subkey [`Store`] contract with in-memory and JSON
//!   file engines.
//!
//! ```text
//! ┌─────────────┐  Inbound   ┌──────────┐  Reply   ┌─────────────┐
//! │   Channel   │───────────▶│ runtime  │─────────▶│   Channel   │
//! │  (backend)  │   (Inbox)  │ dispatch │ (Content)│   send()    │
//! └─────────────┘            └──────────┘          └─────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod channel;
pub mod error;
pub mod message;
pub mod name_index;
pub mod store;

pub use channel::{
    Ack, BoxedChannel, Channel, ChannelId, Destination, Inbound, Inbox, Room, User, Visibility,
};
pub use error::{IndexError, ResolveError, SendError, SendResult, StoreError, StoreResult};
pub use message::{Content, Embed, EmbedField, Outbound, Reply, Target};
pub use name_index::{NameIndex, ResolveMode, normalize};
pub use store::{FileStore, MemoryStore, Store, StoreExt, TransactFn, UpdateFn};

/// A boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
