//! Resilience primitives for the marketplace HTTP gateway
//!
//! Every call to the backend passes through three guards owned by one
//! gateway instance:
//!
//! 1. `CircuitBreaker` rejects calls locally while the backend is unreachable
//! 2. `Deduplicator` collapses identical calls made within a short window
//! 3. `RefreshCoordinator` keeps at most one token refresh in flight and
//!    queues every 401 that arrives meanwhile
//!
//! State lives in `std::sync::Mutex` sections that never span an `.await`,
//! so check-and-set is atomic with respect to concurrent callers.

pub mod breaker;
pub mod classify;
pub mod dedup;
pub mod error;
pub mod refresh;
pub mod session;

pub use breaker::{BreakerState, CircuitBreaker, MAX_COOLDOWN};
pub use classify::{NetworkFailure, StatusClass, classify_status, classify_transport_error};
pub use dedup::{Deduplicator, SharedCall};
pub use error::{Error, Result};
pub use refresh::RefreshCoordinator;
pub use session::{LoginSurface, SessionEndReason, SessionEnded};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a state mutex. Critical sections never panic midway, so a poisoned
/// lock still holds consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
