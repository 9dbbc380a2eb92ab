//! Circuit breaker against an unreachable backend
//!
//! The breaker counts consecutive network-class failures (timeouts, refused
//! connections, DNS errors). HTTP error statuses never count: a 500 proves
//! the server is up. Once the count reaches the threshold the breaker opens
//! and every call is rejected locally until the cooldown elapses.
//!
//! Transitions:
//! - Closed → Open: consecutive failures reach the threshold
//! - Open → Probing: cooldown expired (checked lazily on the next call)
//! - Probing → Closed: the probe call completes an HTTP exchange
//! - Probing → Open: the probe fails, cooldown restarts
//! - any → Closed: any successful exchange resets the counter
//!
//! Uses `tokio::time::Instant` so tests drive the cooldown with a paused clock.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::lock;

/// Longest cooldown the breaker accepts. Longer values are clamped.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { remaining: Duration },
    /// Cooldown expired; the next call is let through as a probe.
    Probing,
}

impl BreakerState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::Probing => "probing",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Consecutive-failure circuit breaker shared by every call of one gateway.
#[derive(Debug)]
pub struct CircuitBreaker {
    counters: Mutex<Counters>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// `threshold` is clamped to at least 1, `cooldown` to `MAX_COOLDOWN`.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            threshold: threshold.max(1),
            cooldown: cooldown.min(MAX_COOLDOWN),
        }
    }

    /// Gate a call. Returns `CircuitOpen` while the cooldown is running.
    pub fn check(&self) -> Result<()> {
        let counters = lock(&self.counters);
        if let Some(until) = counters.open_until {
            let now = Instant::now();
            if now < until {
                metrics::counter!("gateway_breaker_rejections_total").increment(1);
                return Err(Error::CircuitOpen {
                    retry_after: until - now,
                });
            }
        }
        Ok(())
    }

    /// An HTTP exchange completed (any status). Closes the breaker.
    pub fn record_success(&self) {
        let mut counters = lock(&self.counters);
        if counters.open_until.take().is_some() {
            info!("backend reachable again, circuit closed");
        }
        counters.consecutive_failures = 0;
    }

    /// A network-class failure. May open (or re-open) the breaker.
    pub fn record_failure(&self) {
        let mut counters = lock(&self.counters);
        counters.consecutive_failures = counters.consecutive_failures.saturating_add(1);
        if counters.consecutive_failures < self.threshold {
            return;
        }

        let now = Instant::now();
        match counters.open_until {
            // Straggler from before the breaker opened; keep the running cooldown.
            Some(until) if now < until => {}
            Some(_) => {
                counters.open_until = Some(now + self.cooldown);
                warn!(
                    cooldown_secs = self.cooldown.as_secs(),
                    "probe failed, circuit re-opened"
                );
                metrics::counter!("gateway_breaker_opened_total").increment(1);
            }
            None => {
                counters.open_until = Some(now + self.cooldown);
                warn!(
                    failures = counters.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "backend unreachable, circuit opened"
                );
                metrics::counter!("gateway_breaker_opened_total").increment(1);
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        let counters = lock(&self.counters);
        match counters.open_until {
            None => BreakerState::Closed,
            Some(until) => {
                let now = Instant::now();
                if now < until {
                    BreakerState::Open {
                        remaining: until - now,
                    }
                } else {
                    BreakerState::Probing
                }
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        lock(&self.counters).consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
