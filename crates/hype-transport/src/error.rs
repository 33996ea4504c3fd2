//! Proxy error taxonomy.
//!
//! Every failure of a proxied call is classified into one of four variants.
//! Raw transport errors (socket, TLS, HTTP client) never cross the proxy
//! boundary.

use std::time::Duration;

use thiserror::Error;

/// Classified failure of a proxied call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    /// The destination did not answer within the timeout.
    #[error("request to '{destination}' timed out after {elapsed:?}")]
    Timeout {
        /// Destination name.
        destination: String,
        /// Timeout that elapsed.
        elapsed: Duration,
    },

    /// The call was refused by the local limiter or by the destination (429).
    #[error("rate limited by '{destination}'{}", .retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited {
        /// Destination name.
        destination: String,
        /// How long to wait before trying again, when known.
        retry_after: Option<Duration>,
    },

    /// The destination answered with an error status.
    #[error("'{destination}' answered {status}: {body}")]
    Upstream {
        /// Destination name.
        destination: String,
        /// HTTP status code (or protocol equivalent).
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The destination could not be reached, or is not configured.
    #[error("'{destination}' is unreachable: {message}")]
    Unreachable {
        /// Destination name.
        destination: String,
        /// Human-readable cause.
        message: String,
    },
}

impl ProxyError {
    /// Creates a [`ProxyError::Unreachable`].
    pub fn unreachable(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Creates a [`ProxyError::Upstream`], truncating long bodies.
    pub fn upstream(destination: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
            body.push('…');
        }
        Self::Upstream {
            destination: destination.into(),
            status,
            body,
        }
    }

    /// Whether the failure class is worth retrying: timeouts, unreachable
    /// destinations and 5xx answers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unreachable { .. } => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::RateLimited { .. } => false,
        }
    }

    /// Destination the failure relates to.
    pub fn destination(&self) -> &str {
        match self {
            Self::Timeout { destination, .. }
            | Self::RateLimited { destination, .. }
            | Self::Upstream { destination, .. }
            | Self::Unreachable { destination, .. } => destination,
        }
    }
}

const MAX_ERROR_BODY: usize = 512;

/// Result type for proxied calls.
pub type ProxyResult<T> = Result<T, ProxyError>;
