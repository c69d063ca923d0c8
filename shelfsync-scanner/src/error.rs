use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// Timeouts, connection failures and 5xx responses, after retries ran out.
    #[error("fetch failed after {attempts} attempts: {message}")]
    Transient {
        url: String,
        attempts: u32,
        message: String,
    },

    /// The page is confirmed gone. Never retried.
    #[error("page not found (404): {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl ScanError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ScanError::Transient { .. } => true,
            ScanError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ScanError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
