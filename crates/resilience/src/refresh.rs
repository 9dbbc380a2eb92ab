//! Single-flight token refresh
//!
//! When a call comes back 401 the gateway asks the coordinator for a fresh
//! access token. The first caller starts a refresh on a spawned task; every
//! caller that arrives while it runs is queued and released, in arrival
//! order, with the same outcome. The refresh task owns the in-progress flag,
//! so a caller that stops waiting cannot leave the coordinator wedged.
//!
//! Outcomes:
//! - success: new access token stored (refresh token rotated if the backend
//!   sent one) and handed to every waiter
//! - no refresh token, or the backend refuses it: tokens cleared, waiters
//!   rejected with `SessionEnded`, one event broadcast to subscribers
//! - backend unreachable or answering 5xx: waiters rejected with
//!   `Unavailable`, tokens kept
//!
//! A 401 that arrives after its session already ended (the refresh failed
//! before the slower call came back) gets the same `SessionEnded` without a
//! second event. A refresh that panics releases its waiters with `Internal`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::Secret;
use session_auth::{Credentials, TokenStore};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::error::{Error, Result};
use crate::lock;
use crate::session::{LoginSurface, SessionEndReason, SessionEnded};

type Waiter = oneshot::Sender<Result<Secret<String>>>;

/// Capacity of the session-ended broadcast channel.
const SESSION_EVENT_CAPACITY: usize = 16;

/// Coordinates token refreshes for one gateway instance.
pub struct RefreshCoordinator {
    store: Arc<dyn TokenStore>,
    client: reqwest::Client,
    refresh_url: String,
    timeout: Duration,
    breaker: Arc<CircuitBreaker>,
    /// `Some` while a refresh is in flight; holds the queued waiters.
    waiters: Mutex<Option<Vec<Waiter>>>,
    /// Access token of the last session that ended, with its event.
    last_end: Mutex<Option<(Secret<String>, SessionEnded)>>,
    session_events: broadcast::Sender<SessionEnded>,
}

impl RefreshCoordinator {
    /// `refresh_url` is the absolute URL of the refresh endpoint.
    pub fn new(
        store: Arc<dyn TokenStore>,
        client: reqwest::Client,
        refresh_url: String,
        timeout: Duration,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let (session_events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            store,
            client,
            refresh_url,
            timeout,
            breaker,
            waiters: Mutex::new(None),
            last_end: Mutex::new(None),
            session_events,
        }
    }

    /// Subscribe to session-ended events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnded> {
        self.session_events.subscribe()
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        lock(&self.waiters).as_ref().map_or(0, Vec::len)
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        lock(&self.waiters).is_some()
    }

    /// Obtain an access token newer than `stale`.
    ///
    /// `stale` is the token the failed call was sent with (`None` if it was
    /// sent without one). `surface` is reported in the session-ended event if
    /// this caller ends up starting a refresh that fails terminally.
    pub async fn ensure_fresh_token(
        self: &Arc<Self>,
        stale: Option<&str>,
        surface: LoginSurface,
    ) -> Result<Secret<String>> {
        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut waiters = lock(&self.waiters);
            match waiters.as_mut() {
                Some(queue) => {
                    queue.push(tx);
                    debug!(queued = queue.len(), "refresh in flight, queued");
                    false
                }
                None => {
                    *waiters = Some(vec![tx]);
                    true
                }
            }
        };

        if leader {
            let this = Arc::clone(self);
            let stale = stale.map(str::to_owned);
            tokio::spawn(async move {
                let refresh = tokio::spawn({
                    let this = Arc::clone(&this);
                    async move { this.run_refresh(stale.as_deref(), surface).await }
                });
                let outcome = refresh.await.unwrap_or_else(|e| {
                    warn!(error = %e, "token refresh task failed");
                    Err(Error::Internal(format!("token refresh task failed: {e}")))
                });
                let queue = lock(&this.waiters).take().unwrap_or_default();
                for waiter in queue {
                    // Receiver gone means the caller abandoned the request.
                    let _ = waiter.send(outcome.clone());
                }
            });
        }

        rx.await
            .map_err(|_| Error::Internal("refresh task ended without an outcome".into()))?
    }

    async fn run_refresh(
        &self,
        stale: Option<&str>,
        surface: LoginSurface,
    ) -> Result<Secret<String>> {
        let current = self.store.get().await;

        if let Some(access) = &current.access
            && stale.is_none_or(|s| !access.matches(s))
        {
            debug!("access token already rotated, skipping refresh");
            return Ok(access.clone());
        }

        if current.is_empty()
            && let Some(stale) = stale
            && let Some(event) = self.ended_with(stale)
        {
            debug!("session already ended for this token");
            return Err(Error::SessionEnded(event));
        }

        let Some(refresh) = current.refresh else {
            return Err(self
                .end_session(stale, surface, SessionEndReason::NoRefreshToken)
                .await);
        };

        self.breaker.check()?;

        match session_auth::refresh_access_token(
            &self.client,
            &self.refresh_url,
            refresh.expose(),
            self.timeout,
        )
        .await
        {
            Ok(token) => {
                self.breaker.record_success();
                let access = Secret::new(token.access_token);
                let refresh = token.refresh_token.map(Secret::new).unwrap_or(refresh);
                let rotated = Credentials {
                    access: Some(access.clone()),
                    refresh: Some(refresh),
                };
                self.store
                    .set(rotated)
                    .await
                    .map_err(|e| Error::Store(e.to_string()))?;
                info!("token refresh succeeded");
                metrics::counter!("gateway_token_refresh_total", "outcome" => "success")
                    .increment(1);
                Ok(access)
            }
            Err(e @ session_auth::Error::Server { .. }) => {
                // Reachable, and the refresh token may still be good.
                self.breaker.record_success();
                warn!(error = %e, "token refresh failed server-side, tokens kept");
                metrics::counter!("gateway_token_refresh_total", "outcome" => "server_error")
                    .increment(1);
                Err(Error::Unavailable(e.to_string()))
            }
            Err(e) if e.is_terminal() => {
                // The backend answered, so it is reachable.
                self.breaker.record_success();
                debug!(error = %e, "refresh token refused");
                Err(self
                    .end_session(stale, surface, SessionEndReason::RefreshRejected)
                    .await)
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!(error = %e, "token refresh failed, backend unreachable");
                metrics::counter!("gateway_token_refresh_total", "outcome" => "unavailable")
                    .increment(1);
                Err(Error::Unavailable(e.to_string()))
            }
        }
    }

    fn ended_with(&self, stale: &str) -> Option<SessionEnded> {
        lock(&self.last_end)
            .as_ref()
            .filter(|(token, _)| token.matches(stale))
            .map(|(_, event)| *event)
    }

    /// Clear tokens and broadcast the end of the session.
    async fn end_session(
        &self,
        stale: Option<&str>,
        surface: LoginSurface,
        reason: SessionEndReason,
    ) -> Error {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear tokens at session end");
        }
        let event = SessionEnded { surface, reason };
        if let Some(stale) = stale {
            *lock(&self.last_end) = Some((Secret::from(stale), event));
        }
        info!(
            surface = surface.label(),
            reason = reason.label(),
            "session ended"
        );
        metrics::counter!("gateway_token_refresh_total", "outcome" => reason.label())
            .increment(1);
        // No subscribers is fine: the error still reaches every caller.
        let _ = self.session_events.send(event);
        Error::SessionEnded(event)
    }
}
