use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Provider {provider} error [{code}]: {message}")]
    Provider {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Rate limit exceeded for provider {0}")]
    RateLimited(String),

    #[error("Scraping failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Scraping {
        status: Option<u16>,
        message: String,
    },

    #[error("Circuit breaker open: rejecting call without I/O")]
    CircuitOpen,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

impl ScannerError {
    /// Provider-boundary error with a stable machine-readable code.
    pub fn provider(provider: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn scraping(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Scraping {
            status,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScannerError>;
