//! Error types and handling for InvSync
//!
//! Errors carry enough structure for the retry layer to decide whether an
//! operation is worth repeating, and for the orchestrator to render a
//! per-action message without losing the original error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - operation should be retried
    Medium,
    /// High severity - operation should be aborted
    High,
    /// Critical severity - entire process should be terminated
    Critical,
}

/// Classification of a failure reported by the fetch provider.
///
/// The provider boundary tags its errors once, so retry predicates can match
/// on the tag instead of re-parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderErrorKind {
    /// The call did not finish in time
    Timeout,
    /// Upstream rate limiting (429, throttling)
    Throttled,
    /// Upstream 5xx / gateway failures
    ServerError,
    /// Connection refused or host not resolvable
    ConnectionRefused,
    /// The requested subscription or resource does not exist
    NotFound,
    /// Anything else
    Unknown,
}

impl ProviderErrorKind {
    /// Classify a raw provider message (stderr, HTTP body...) into a kind.
    ///
    /// Matching is case-insensitive and substring based.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if contains_any(&["timeout", "timed out", "etimedout"]) {
            Self::Timeout
        } else if contains_any(&["rate limit", "throttl", "too many requests", "429"]) {
            Self::Throttled
        } else if contains_any(&["econnrefused", "connection refused", "enotfound", "socket hang up"]) {
            Self::ConnectionRefused
        } else if contains_any(&["500", "502", "503", "504", "service unavailable", "bad gateway"]) {
            Self::ServerError
        } else if contains_any(&["not found", "404", "could not be found"]) {
            Self::NotFound
        } else {
            Self::Unknown
        }
    }

    /// Whether failures of this kind are worth retrying
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Throttled | Self::ServerError | Self::ConnectionRefused
        )
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Throttled => "throttled",
            Self::ServerError => "server-error",
            Self::ConnectionRefused => "connection-refused",
            Self::NotFound => "not-found",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Main error type for InvSync operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The fetch provider failed
    #[error("{message}")]
    Provider {
        /// Tagged failure class
        kind: ProviderErrorKind,
        /// Message reported by the provider
        message: String,
    },

    /// Malformed input (provider payload, record about to be persisted)
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the violated constraint
        message: String,
    },

    /// The persistent store failed
    #[error("Store error: {message}")]
    Store {
        /// Error message from the store
        message: String,
    },

    /// A record addressed by name does not exist
    #[error("Resource not found: {name}")]
    NotFound {
        /// Resource name
        name: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Synchronization error
    #[error("Synchronization error: {message}")]
    Sync {
        /// Error message describing the synchronization issue
        message: String,
    },

    /// Another run holds the single-flight guard
    #[error("A synchronization run is already in progress")]
    SyncInProgress,

    /// Operation timed out
    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// (De)serialization failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message from the serializer
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fetch provider errors
    Provider,
    /// Validation errors
    Validation,
    /// Store errors (including missing records)
    Store,
    /// Configuration errors
    Config,
    /// Synchronization errors
    Sync,
    /// Cancellation
    Cancelled,
    /// Timeout
    Timeout,
    /// I/O and serialization errors
    Io,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Store { .. } | Self::NotFound { .. } => ErrorKind::Store,
            Self::Config { .. } => ErrorKind::Config,
            Self::Sync { .. } | Self::SyncInProgress => ErrorKind::Sync,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Io { .. } | Self::Serialization { .. } => ErrorKind::Io,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Provider { kind, .. } => {
                if kind.is_transient() {
                    ErrorSeverity::Medium
                } else {
                    ErrorSeverity::High
                }
            }
            Self::Validation { .. } => ErrorSeverity::High,
            Self::Store { .. } => ErrorSeverity::Medium,
            Self::NotFound { .. } => ErrorSeverity::Low,
            Self::Config { .. } => ErrorSeverity::High,
            Self::Sync { .. } => ErrorSeverity::Medium,
            Self::SyncInProgress => ErrorSeverity::Low,
            Self::Timeout { .. } => ErrorSeverity::Medium,
            Self::Cancelled => ErrorSeverity::Low,
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::Serialization { .. } => ErrorSeverity::High,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider { kind, .. } => kind.is_transient(),
            Self::Io { message } => {
                message.contains("Interrupted")
                    || message.contains("WouldBlock")
                    || message.contains("TimedOut")
            }
            Self::Timeout { .. } | Self::Store { .. } | Self::Sync { .. } | Self::Other { .. } => {
                true
            }
            Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::Config { .. }
            | Self::SyncInProgress
            | Self::Cancelled
            | Self::Serialization { .. } => false,
        }
    }

    /// Check if this error should trigger a retry
    pub fn should_retry(&self) -> bool {
        self.is_recoverable() && self.severity() <= ErrorSeverity::Medium
    }

    /// The provider tag, when this is a provider failure
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            Self::Timeout { .. } => Some(ProviderErrorKind::Timeout),
            _ => None,
        }
    }

    /// Create a provider error, classifying the message
    pub fn provider<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        Self::Provider {
            kind: ProviderErrorKind::classify(&message),
            message,
        }
    }

    /// Create a provider error with an explicit kind
    pub fn provider_with_kind<S: Into<String>>(kind: ProviderErrorKind, message: S) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new sync error
    pub fn sync<S: Into<String>>(message: S) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}
