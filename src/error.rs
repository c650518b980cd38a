use thiserror::Error;

/// Main error type for prism operations
#[derive(Debug, Error)]
pub enum PrismError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No active store connection (select a profile first)")]
    NotInitialized,

    #[error("Remote store error: {0}")]
    RemoteError(String),

    #[error("Upload failed: {0}")]
    UploadError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl PrismError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn remote<S: Into<String>>(msg: S) -> Self {
        Self::RemoteError(msg.into())
    }

    pub fn upload<S: Into<String>>(msg: S) -> Self {
        Self::UploadError(msg.into())
    }

    pub fn cache<S: Into<String>>(msg: S) -> Self {
        Self::CacheError(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::SerializationError(msg.into())
    }
}

/// Result type alias for prism operations
pub type Result<T> = std::result::Result<T, PrismError>;
