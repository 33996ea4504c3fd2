//! Error types for the Hype framework.

use std::time::Duration;

use hype_core::{IndexError, Reply, StoreError};
use hype_transport::ProxyError;
use thiserror::Error;

use crate::roles::Role;

/// Fatal configuration errors raised while composing commands and jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two commands share a canonical name.
    #[error("command '{0}' is registered twice")]
    DuplicateCommand(String),

    /// A name or alias collides with another command's lookup key.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Two jobs share a name.
    #[error("job '{0}' is registered twice")]
    DuplicateJob(String),

    /// A configuration override names a command nobody registered.
    #[error("configuration refers to unknown command '{0}'")]
    UnknownCommand(String),

    /// A job's trigger can never fire sensibly.
    #[error("job '{name}' has an invalid trigger: {reason}")]
    InvalidJob {
        /// Job name.
        name: String,
        /// What is wrong with the trigger.
        reason: String,
    },
}

/// Result type for registration.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A failure reported by a command handler or job.
///
/// The `message` is logged; the optional `notice` is shown to the user
/// instead of the generic failure notice.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    notice: Option<String>,
}

impl HandlerError {
    /// Creates an internal failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            notice: None,
        }
    }

    /// Creates a failure whose message is safe to show to the user.
    pub fn user(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            notice: Some(message.clone()),
            message,
        }
    }

    /// Failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// User-facing notice, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}

impl From<ProxyError> for HandlerError {
    fn from(e: ProxyError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type returned by handlers and jobs.
pub type HandlerResult<T = Reply> = Result<T, HandlerError>;

/// Why a command message did not run to completion.
///
/// All variants are resolved locally into a user-facing reply (or silence)
/// and never escalate past the dispatcher.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No enabled command matches.
    #[error("unknown command '{query}'")]
    NotFound {
        /// Token the user typed.
        query: String,
    },

    /// Several commands match equally well.
    #[error("'{query}' is ambiguous: {}", .candidates.join(", "))]
    Ambiguous {
        /// Token the user typed.
        query: String,
        /// Matching commands, shortest first.
        candidates: Vec<String>,
    },

    /// The user's role is below the command's requirement.
    #[error("'{command}' requires role {required}")]
    PermissionDenied {
        /// Canonical command name.
        command: String,
        /// Role the command requires.
        required: Role,
    },

    /// The command ran too recently for this scope.
    #[error("'{command}' is on cooldown for another {remaining:?}")]
    Cooldown {
        /// Canonical command name.
        command: String,
        /// Time left before the next allowed run.
        remaining: Duration,
    },

    /// The handler reported a failure or panicked.
    #[error("'{command}' failed: {source}")]
    Handler {
        /// Canonical command name.
        command: String,
        /// Handler failure.
        source: HandlerError,
    },

    /// The handler did not finish in time and was abandoned.
    #[error("'{command}' timed out after {timeout:?}")]
    HandlerTimeout {
        /// Canonical command name.
        command: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
}

/// Errors returned by the scheduler handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// No job with this name exists.
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    /// A job with this name is already scheduled.
    #[error("job '{0}' already exists")]
    DuplicateJob(String),

    /// The trigger is zero-length or too far in the future.
    #[error("job '{job}' has an invalid trigger: {reason}")]
    InvalidTrigger {
        /// Job name.
        job: String,
        /// What is wrong with the trigger.
        reason: String,
    },

    /// The scheduler task is no longer running.
    #[error("scheduler is not running")]
    Stopped,
}
