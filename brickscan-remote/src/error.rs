use brickscan_core::FailureReason;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Server error: HTTP {0}")]
    Server(u16),

    #[error("Request rejected: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid response from service: {0}")]
    InvalidResponse(String),

    #[error("Could not encode crop: {0}")]
    Encoding(String),

    #[error("Giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<RemoteError> },
}

pub type Result<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    /// Worth retrying: timeouts, connection failures, 5xx and 429
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::HttpRequest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RemoteError::RateLimit | RemoteError::Server(_) => true,
            _ => false,
        }
    }

    /// Item-level reason recorded in results
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            RemoteError::HttpRequest(e) if e.is_decode() => FailureReason::InvalidResponse,
            RemoteError::HttpRequest(_)
            | RemoteError::RateLimit
            | RemoteError::Server(_)
            | RemoteError::Exhausted { .. } => FailureReason::ServiceUnreachable,
            RemoteError::Rejected { status, .. } => FailureReason::Rejected { status: *status },
            RemoteError::AuthenticationFailed => FailureReason::Unauthorized,
            RemoteError::InvalidResponse(_) => FailureReason::InvalidResponse,
            RemoteError::Encoding(_) => FailureReason::UnreadableCrop,
        }
    }
}
