use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Transient network error: {0}")]
    TransientNetworkError(String),

    #[error("Malformed response: {0}")]
    MalformedResponseError(String),

    #[error("GitHub API error: {0}")]
    ApiError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error at line {line}: {message}")]
    CsvError { line: usize, message: String },
}

impl CollectorError {
    /// Errors the client retries locally before giving up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollectorError::TransientNetworkError(_))
    }

    /// Errors that abort the whole run instead of skipping one target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollectorError::AuthError(_)
                | CollectorError::RateLimitExceeded(_)
                | CollectorError::TransientNetworkError(_)
                | CollectorError::ConfigError(_)
                | CollectorError::HttpError(_)
                | CollectorError::IoError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
