//! Unified error system for the metainfo service
//!
//! Every client-visible failure is one of a closed set of kinds. Transport
//! layers map a kind to their own status code through [`MetainfoError::status_code`].

use serde::{Deserialize, Serialize};

/// Transport-level status codes a [`MetainfoError`] maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// Missing, malformed or expired credentials
    Unauthenticated,
    /// Request was malformed or violated policy
    InvalidArgument,
    /// Referenced entity does not exist
    NotFound,
    /// Entity already exists
    AlreadyExists,
    /// Project usage limit reached
    ResourceExhausted,
    /// Server-side failure
    Internal,
}

/// Unified error type for all metainfo operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MetainfoError {
    /// Bad, expired or missing capability token or permission
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Error message describing the authentication failure
        message: String,
    },

    /// Malformed path, invalid redundancy scheme, size mismatch
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message describing the invalid input
        message: String,
    },

    /// Missing bucket, object or segment
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Duplicate bucket or attribution
    #[error("Already exists: {message}")]
    AlreadyExists {
        /// Error message describing the conflicting entity
        message: String,
    },

    /// Project usage limit exceeded
    #[error("Resource exhausted: {message}")]
    ResourceExhausted {
        /// Error message describing the exhausted resource
        message: String,
    },

    /// Store, collaborator or marshaling failure
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl MetainfoError {
    /// Create an unauthenticated error
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an already exists error
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// Create a resource exhausted error
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an internal error for a failed encode or decode
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Internal {
            message: format!("Serialization failed: {}", message.into()),
        }
    }

    /// Status code for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::Unauthenticated,
            Self::InvalidArgument { .. } => StatusCode::InvalidArgument,
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::AlreadyExists { .. } => StatusCode::AlreadyExists,
            Self::ResourceExhausted { .. } => StatusCode::ResourceExhausted,
            Self::Internal { .. } => StatusCode::Internal,
        }
    }

    /// Whether a client may retry the call after backing off
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.status_code(),
            StatusCode::Internal | StatusCode::ResourceExhausted
        )
    }

    /// Whether this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Human-readable detail without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthenticated { message }
            | Self::InvalidArgument { message }
            | Self::NotFound { message }
            | Self::AlreadyExists { message }
            | Self::ResourceExhausted { message }
            | Self::Internal { message } => message,
        }
    }
}

/// Standard Result type for metainfo operations
pub type Result<T> = std::result::Result<T, MetainfoError>;

impl From<bincode::Error> for MetainfoError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for MetainfoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}
