//! Error types for session store operations.

use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;

/// Logical step of a store operation, reported when a backend command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Existence check performed by `create` under the reject collision policy.
    CreateCheck,
    /// Initial write (hash-set or expire) performed by `create`.
    CreateWrite,
    /// Hash-get-all performed by `find`.
    HashGetAll,
    /// Removal of pending fields performed by `save`.
    HashDelete,
    /// Write of the current field set performed by `save`.
    HashSet,
    /// TTL renewal performed by `save`.
    Expire,
    /// Key removal performed by `delete`.
    KeyDelete,
    /// Release of the backend connection.
    Close,
}

impl Operation {
    /// Stable name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCheck => "create-check",
            Self::CreateWrite => "create-write",
            Self::HashGetAll => "hash-get-all",
            Self::HashDelete => "hash-delete",
            Self::HashSet => "hash-set",
            Self::Expire => "expire",
            Self::KeyDelete => "key-delete",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The connection was already released.
    #[error("connection closed")]
    Closed,

    /// The backing store could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backing store rejected a command.
    #[error("command error: {0}")]
    Command(String),

    /// Error from the Redis client.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type for backend commands.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Error type for session and store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No record exists for the session ID (never created, expired or deleted).
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The requested field is not set on the session.
    #[error("Value not found: {0}")]
    ValueNotFound(String),

    /// A backing store command failed.
    #[error("Operation {operation} failed: {source}")]
    OperationFailed {
        operation: Operation,
        #[source]
        source: BackendError,
    },

    /// A value could not be serialized.
    #[error("Failed to encode value '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be deserialized into the requested type.
    #[error("Failed to decode value '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The stored record is missing its validity or holds an unreadable one.
    #[error("Session '{id}' is corrupted: {reason}")]
    Corrupted { id: String, reason: String },

    /// A record already exists under the ID and overwriting is not allowed.
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// Session IDs must not be empty.
    #[error("Session ID must not be empty")]
    EmptyId,

    /// The field name is used internally and cannot be set by callers.
    #[error("Field name '{0}' is reserved")]
    ReservedField(String),

    /// Validity below one second or above the backing store's expire limit.
    #[error(
        "Validity must be between one second and {max} seconds, got {0:?}",
        max = crate::config::MAX_VALIDITY_SECS
    )]
    InvalidValidity(Duration),

    /// Invalid store configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Wrap a backend error with the operation that produced it.
    pub fn operation(operation: Operation, source: BackendError) -> Self {
        Self::OperationFailed { operation, source }
    }

    /// Whether this is the expected "no such session" outcome rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The failed operation, if a backend command caused this error.
    pub fn failed_operation(&self) -> Option<Operation> {
        match self {
            Self::OperationFailed { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

/// Result type for session and store operations.
pub type Result<T> = std::result::Result<T, Error>;
