//! Error types for resilience operations

use std::time::Duration;

use crate::session::SessionEnded;

/// Errors produced by the breaker, deduplicator and refresh coordinator.
///
/// `Clone` because one outcome is handed to every waiter of a shared call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("server unavailable: circuit open, retry in {}s", .retry_after.as_secs())]
    CircuitOpen { retry_after: Duration },

    #[error("server unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    SessionEnded(SessionEnded),

    #[error("token store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for resilience operations.
pub type Result<T> = std::result::Result<T, Error>;
