use thiserror::Error;

use snitchr_types::ValidationError;

/// The store refused a well-formed request. Rolls back, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("confession {0} not found")]
    NotFound(String),

    #[error("store rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("network error: {0}")]
    Network(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("realtime feed lost {missed} events")]
    FeedGap { missed: u64 },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid store url: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Only transport failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
