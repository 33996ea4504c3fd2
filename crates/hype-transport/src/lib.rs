//! # Hype Transport
//!
//! Outbound calls made by plugins (game statistics, stock quotes, webhooks)
//! all go through one [`Proxy`], which applies shared policy per destination:
//!
//! - **Rate limiting**: token bucket or fixed window ([`RateLimitPolicy`]),
//!   state shared by every concurrent caller of the same destination.
//! - **Retries**: bounded exponential backoff on transient failures
//!   ([`RetryPolicy`]).
//! - **Caching**: responses keyed by a SHA-256 request fingerprint, with an
//!   explicit TTL per request ([`ResponseCache`]).
//!
//! Every failure surfaces as a classified [`ProxyError`]; raw client errors
//! never escape.
//!
//! ## Feature Flags
//!
//! - `http-client` (default): [`HttpTransport`] over `reqwest`.

pub mod cache;
pub mod error;
#[cfg(feature = "http-client")]
pub mod http;
pub mod proxy;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod transport;

pub use cache::ResponseCache;
pub use error::{ProxyError, ProxyResult};
#[cfg(feature = "http-client")]
pub use http::HttpTransport;
pub use proxy::{Proxy, ProxyBuilder};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
pub use request::{Method, ProxyRequest, ProxyResponse};
pub use retry::RetryPolicy;
pub use transport::{Endpoint, Transport};
