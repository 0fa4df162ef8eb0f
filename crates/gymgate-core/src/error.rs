use thiserror::Error;

/// Uniform error for every remote call.
///
/// `Display` is the human-readable text surfaced to the operator, so the
/// server-provided variants render the bare message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The service could not be reached (DNS, connect, timeout, TLS).
    #[error("connection error: {0}")]
    Transport(String),
    /// Non-2xx response.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// 2xx response whose body could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// 2xx envelope with `success: false` or a missing payload.
    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    /// HTTP status code, if the service answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}
