//! Runtime error types.

use hype_core::{SendError, StoreError};
use hype_framework::RegistryError;
use hype_transport::ProxyError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort composition or startup.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin registered conflicting commands or jobs.
    #[error("Registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// The store could not be opened.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The outbound-call proxy could not be built.
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    /// A channel failed to start.
    #[error("Channel '{channel}' failed to start: {source}")]
    Channel {
        channel: String,
        #[source]
        source: SendError,
    },

    /// Two channels share an id.
    #[error("Channel '{0}' is registered twice")]
    DuplicateChannel(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
