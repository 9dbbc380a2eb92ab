//! Error types for gateway calls

use std::time::Duration;

use reqwest::StatusCode;
use resilience::SessionEnded;

use crate::response::Response;

/// Everything a gateway call can fail with.
///
/// `Clone` because deduplicated callers all receive the same outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network-class failure: timeout, refused connection, DNS, broken transport.
    #[error("server unavailable: {0}")]
    Unavailable(String),

    /// Rejected locally without touching the network.
    #[error("server unavailable: circuit open, retry in {}s", .retry_after.as_secs())]
    CircuitOpen { retry_after: Duration },

    /// No usable credentials remain; tokens are already cleared.
    #[error("{0}")]
    SessionEnded(SessionEnded),

    /// The backend answered with a non-success status. Body kept verbatim.
    #[error("backend returned {}", .0.status())]
    Application(Response),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("token store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Unified "server unavailable" condition, whether detected by a failed
    /// call or by the open breaker.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::CircuitOpen { .. })
    }

    pub fn is_session_ended(&self) -> bool {
        matches!(self, Error::SessionEnded(_))
    }

    /// Status of the backend response, for `Application` errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Application(response) => Some(response.status()),
            _ => None,
        }
    }

    /// Outcome label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Error::Unavailable(_) => "unavailable",
            Error::CircuitOpen { .. } => "circuit_open",
            Error::SessionEnded(_) => "session_ended",
            Error::Application(_) => "application_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Decode(_) => "decode_error",
            Error::Store(_) => "store_error",
            Error::Config(_) => "config_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl From<resilience::Error> for Error {
    fn from(err: resilience::Error) -> Self {
        match err {
            resilience::Error::CircuitOpen { retry_after } => Error::CircuitOpen { retry_after },
            resilience::Error::Unavailable(msg) => Error::Unavailable(msg),
            resilience::Error::SessionEnded(ended) => Error::SessionEnded(ended),
            resilience::Error::Store(msg) => Error::Store(msg),
            resilience::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<common::Error> for Error {
    fn from(err: common::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<session_auth::Error> for Error {
    fn from(err: session_auth::Error) -> Self {
        Error::Store(err.to_string())
    }
}

/// Result alias for gateway calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use resilience::{LoginSurface, SessionEndReason};

    #[test]
    fn unavailable_covers_both_detection_paths() {
        assert!(Error::Unavailable("connect".into()).is_unavailable());
        assert!(
            Error::CircuitOpen {
                retry_after: Duration::from_secs(30)
            }
            .is_unavailable()
        );
        assert!(!Error::InvalidRequest("bad".into()).is_unavailable());
    }

    #[test]
    fn application_error_exposes_status() {
        let response = Response::new(StatusCode::NOT_FOUND, HeaderMap::new(), "missing".into());
        let err = Error::Application(response);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.to_string(), "backend returned 404 Not Found");
        assert_eq!(err.outcome(), "application_error");
    }

    #[test]
    fn resilience_errors_convert_one_to_one() {
        let ended = SessionEnded {
            surface: LoginSurface::Admin,
            reason: SessionEndReason::RefreshRejected,
        };
        let err: Error = resilience::Error::SessionEnded(ended).into();
        assert!(err.is_session_ended());
        assert!(err.to_string().contains("admin login"));

        let err: Error = resilience::Error::CircuitOpen {
            retry_after: Duration::from_secs(12),
        }
        .into();
        assert_eq!(err.to_string(), "server unavailable: circuit open, retry in 12s");
    }
}
