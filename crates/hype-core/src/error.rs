//! Error types shared across the Hype core.

use thiserror::Error;

use crate::channel::ChannelId;

/// Errors raised while registering names into a [`NameIndex`](crate::NameIndex).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// A derived lookup key is already owned by another canonical name.
    #[error("lookup key '{key}' for '{attempted}' already maps to '{existing}'")]
    DuplicateKey {
        /// The normalized key that collided.
        key: String,
        /// Canonical name currently owning the key.
        existing: String,
        /// Canonical name that tried to claim it.
        attempted: String,
    },

    /// A name or alias normalizes to an empty key.
    #[error("name '{0}' contains no usable characters")]
    EmptyKey(String),
}

/// Errors returned by [`NameIndex::resolve`](crate::NameIndex::resolve).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Nothing matches the query.
    #[error("no name matches '{query}'")]
    NotFound {
        /// The raw query.
        query: String,
    },

    /// Several canonical names match and none can be preferred.
    #[error("'{query}' is ambiguous: {}", .candidates.join(", "))]
    Ambiguous {
        /// The raw query.
        query: String,
        /// Matching canonical names, shortest first then lexicographic.
        candidates: Vec<String>,
    },
}

/// Errors raised by channel backends when delivering content.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The backend connection is gone.
    #[error("channel is closed")]
    Closed,

    /// No backend is registered under this identity.
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// The backend cannot render this kind of content or destination.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// The remote side refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors raised by [`Store`](crate::Store) implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A value could not be (de)serialized.
    #[error("serialization error for {key}/{subkey}: {message}")]
    Serialization {
        /// Primary key.
        key: String,
        /// Subkey.
        subkey: String,
        /// Serializer message.
        message: String,
    },

    /// An increment was attempted on a value that is not an integer.
    #[error("value at {key}/{subkey} is not an integer: {value}")]
    NotAnInteger {
        /// Primary key.
        key: String,
        /// Subkey.
        subkey: String,
        /// The offending value.
        value: String,
    },
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for channel sends.
pub type SendResult<T> = Result<T, SendError>;
