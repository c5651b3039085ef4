use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please review it and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    #[error("Music library at {path} is unusable: {reason}")]
    LibraryUnavailable { path: PathBuf, reason: String },

    // Settings document errors
    #[error("Failed to parse settings document: {0}")]
    SettingsParseError(#[from] serde_json::Error),

    // Lookup errors
    #[error("Song not found: {path}")]
    SongNotFound { path: PathBuf },

    // Remote metadata errors
    #[error("Metadata provider {provider} failed: {reason}")]
    ProviderFailed { provider: String, reason: String },

    #[error("No search results for: {query}")]
    NoSearchResults { query: String },

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Network middleware failed: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    // Tag container errors
    #[error("Failed to read tags from {path}: {reason}")]
    TagRead { path: PathBuf, reason: String },

    #[error("Failed to write tags to {path}: {reason}")]
    TagWrite { path: PathBuf, reason: String },

    // Session errors
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
