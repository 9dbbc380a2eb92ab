//! Error types for token storage and refresh

/// Errors from token storage and the refresh endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Transport-level failure: timeout, connection refused, DNS.
    #[error("refresh endpoint unreachable: {0}")]
    Network(String),

    /// The backend refused the refresh token (400, 401 or 403).
    #[error("refresh token rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The backend answered with any other error status, e.g. a 503 while it
    /// cold-starts. Says nothing about the refresh token.
    #[error("refresh endpoint failed ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("token file parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether the refresh token is unusable and the session must end.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Rejected { .. } | Error::InvalidResponse(_))
    }
}

/// Result alias for session auth operations.
pub type Result<T> = std::result::Result<T, Error>;
