use thiserror::Error;

/// Errors reported by a [`DistributedStore`](crate::store::DistributedStore) adapter.
///
/// These travel through the accessors unchanged, wrapped in [`CacheError::Store`]. No retry or
/// backoff happens above the adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store entry for key `{key}`: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The adapter abandoned an in-flight call because its cancellation token fired.
    #[error("store call cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum CacheError {
    /// Stored bytes exist and are not blank, but do not parse as the requested type.
    #[error("failed to decode value stored under `{key}`: {reason}")]
    Decode { key: String, reason: String },
    #[error("failed to encode value for `{key}`: {reason}")]
    Encode { key: String, reason: String },
    #[error("index {index} is out of range for collection of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Store(StoreError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid cache configuration: {0}")]
    Config(String),
}

impl From<StoreError> for CacheError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Cancelled => CacheError::Cancelled,
            other => CacheError::Store(other),
        }
    }
}

impl CacheError {
    pub fn decode(key: &str, reason: impl ToString) -> Self {
        Self::Decode {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn encode(key: &str, reason: impl ToString) -> Self {
        Self::Encode {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
