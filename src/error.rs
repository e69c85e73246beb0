use thiserror::Error;

/// Unified error type for the batching engine.
///
/// Everything here is fatal for the operation as a whole: per-request failures
/// (permanent statuses, exhausted retries) are reported through
/// [`crate::types::ResultEntry`] instead and never surface as an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("empty batch: at least one request is required")]
    EmptyBatch,

    #[error("batch endpoint returned HTTP {status}: {message}")]
    Endpoint { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
