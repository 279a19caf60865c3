/// Error types for session lifecycle operations
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Code exchange rejected: {0}")]
    ExchangeRejected(String),

    #[error("Session rejected by backend with status {0}")]
    SessionRejected(StatusCode),

    #[error("No access token stored, log in first")]
    MissingCredential,

    #[error("Identity provider error: {error}, description: {description:?}")]
    ProviderError {
        error: String,
        description: Option<String>,
    },

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Timeout waiting for callback")]
    CallbackTimeout,

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
