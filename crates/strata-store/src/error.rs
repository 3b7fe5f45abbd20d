//! Store errors

use strata_core::MetainfoError;

/// Errors from the key-value engine and the services built on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Key is not present
    #[error("key not found: {key}")]
    KeyNotFound {
        /// Key as lossy UTF-8
        key: String,
    },
    /// Compare-and-swap saw a different value than expected
    #[error("value changed: {key}")]
    ValueChanged {
        /// Key as lossy UTF-8
        key: String,
    },
    /// Empty keys are never stored
    #[error("empty key")]
    EmptyKey,
    /// Listing options were inconsistent
    #[error("invalid list options: {message}")]
    InvalidOptions {
        /// What was wrong
        message: String,
    },
    /// Underlying engine failed
    #[error("storage backend error: {message}")]
    Backend {
        /// Engine error
        message: String,
    },
}

impl StoreError {
    /// Not-found error for a raw key
    pub fn key_not_found(key: &[u8]) -> Self {
        Self::KeyNotFound {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Value-changed error for a raw key
    pub fn value_changed(key: &[u8]) -> Self {
        Self::ValueChanged {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Whether the key was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

impl From<StoreError> for MetainfoError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound { .. } => MetainfoError::not_found(err.to_string()),
            StoreError::InvalidOptions { .. } | StoreError::EmptyKey => {
                MetainfoError::invalid_argument(err.to_string())
            }
            other => MetainfoError::internal(other.to_string()),
        }
    }
}
