//! The gateway: every backend call goes through `HttpGateway::request`
//!
//! Per call:
//! 1. Breaker open: reject locally, no network, no dedup bookkeeping
//! 2. Identical calls within the dedup window share one execution
//! 3. Send with the current access token and a fixed timeout
//! 4. Any completed exchange resets the breaker; transport failures feed it
//! 5. A 401 outside the auth endpoints goes through the refresh coordinator
//!    and the call is resent once with the new token
//! 6. Every other non-2xx status is handed back verbatim

use std::sync::Arc;
use std::time::Instant;

use common::Secret;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use resilience::{
    BreakerState, CircuitBreaker, Deduplicator, RefreshCoordinator, SessionEnded, StatusClass,
    classify_status, classify_transport_error,
};
use session_auth::{Credentials, TokenStore};
use tokio::sync::broadcast;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics;
use crate::request::{Call, RequestOptions};
use crate::response::Response;

/// Handle to one gateway instance. Clones share all state.
#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    client: reqwest::Client,
    store: Arc<dyn TokenStore>,
    breaker: Arc<CircuitBreaker>,
    dedup: Deduplicator<Result<Response>>,
    refresh: Arc<RefreshCoordinator>,
}

impl HttpGateway {
    /// Build a gateway with its own HTTP client.
    pub fn new(config: Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(config, store, client)
    }

    /// Build a gateway on an existing client (shared pools, custom TLS).
    pub fn with_client(
        config: Config,
        store: Arc<dyn TokenStore>,
        client: reqwest::Client,
    ) -> Result<Self> {
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker.failure_threshold,
            config.breaker_cooldown(),
        ));
        let refresh = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            client.clone(),
            config.url_for(&config.auth.refresh_path),
            config.timeout(),
            Arc::clone(&breaker),
        ));
        let dedup = Deduplicator::new(config.dedup_window());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                store,
                breaker,
                dedup,
                refresh,
            }),
        })
    }

    /// Perform a call against the backend.
    ///
    /// Resolves with the response for 2xx statuses. Everything else is an
    /// `Error`; non-2xx responses arrive intact inside `Error::Application`.
    #[instrument(skip_all, fields(request_id, method = %method, path = %path))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let started = Instant::now();
        let method_label = method.to_string();

        let result = match Call::new(method, path, options, &self.inner.config) {
            Ok(call) => {
                tracing::Span::current().record("request_id", call.request_id.as_str());
                self.dispatch(call).await
            }
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        metrics::record_request(&method_label, outcome, started.elapsed().as_secs_f64());
        result
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.request(Method::GET, path, RequestOptions::new()).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        self.request(Method::POST, path, RequestOptions::new().json(body))
            .await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        self.request(Method::PUT, path, RequestOptions::new().json(body))
            .await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        self.request(Method::PATCH, path, RequestOptions::new().json(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.request(Method::DELETE, path, RequestOptions::new())
            .await
    }

    /// Receive an event each time the session ends involuntarily.
    pub fn subscribe_session_events(&self) -> broadcast::Receiver<SessionEnded> {
        self.inner.refresh.subscribe()
    }

    /// Store the token pair returned by a login call.
    pub async fn establish_session(&self, credentials: Credentials) -> Result<()> {
        self.inner.store.set(credentials).await?;
        info!("session established");
        Ok(())
    }

    /// Forget the stored tokens (logout). Does not emit a session event.
    pub async fn end_session(&self) -> Result<()> {
        self.inner.store.clear().await?;
        info!("session ended by caller");
        Ok(())
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.inner.breaker.state()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Point-in-time view of the resilience state.
    pub async fn health(&self) -> serde_json::Value {
        let inner = &self.inner;
        let state = inner.breaker.state();
        let open_remaining_secs = match state {
            BreakerState::Open { remaining } => remaining.as_secs(),
            _ => 0,
        };
        let has_access_token = inner.store.get().await.access.is_some();

        serde_json::json!({
            "status": if matches!(state, BreakerState::Open { .. }) { "unavailable" } else { "available" },
            "breaker": {
                "state": state.label(),
                "consecutive_failures": inner.breaker.consecutive_failures(),
                "threshold": inner.breaker.threshold(),
                "open_remaining_secs": open_remaining_secs,
            },
            "refresh_in_flight": inner.refresh.is_refreshing(),
            "dedup_entries": inner.dedup.len(),
            "session": {
                "has_access_token": has_access_token,
            },
        })
    }

    async fn dispatch(&self, call: Call) -> Result<Response> {
        self.inner.breaker.check()?;

        match call.dedup_key(self.inner.config.dedup.collapse_mutations) {
            Some(key) => {
                let inner = Arc::clone(&self.inner);
                let span = tracing::Span::current();
                self.inner
                    .dedup
                    .dedupe(key, move || execute(inner, call).instrument(span))
                    .await?
            }
            None => execute(Arc::clone(&self.inner), call).await,
        }
    }
}

/// Send a call, refreshing and resending once on a stale token.
async fn execute(inner: Arc<Inner>, call: Call) -> Result<Response> {
    let token = inner.store.get().await.access;
    let response = inner.send(&call, token.as_ref()).await?;

    match classify_status(response.status().as_u16()) {
        StatusClass::Success => Ok(response),
        StatusClass::AuthExpired if call.may_refresh() => {
            debug!("access token rejected, refreshing");
            let stale = token.as_ref().map(|t| t.expose().as_str());
            let fresh = inner
                .refresh
                .ensure_fresh_token(stale, call.surface)
                .await?;

            inner.breaker.check()?;
            let retry = call.retry();
            let response = inner.send(&retry, Some(&fresh)).await?;
            match classify_status(response.status().as_u16()) {
                StatusClass::Success => Ok(response),
                _ => Err(Error::Application(response)),
            }
        }
        _ => Err(Error::Application(response)),
    }
}

impl Inner {
    /// One HTTP exchange. Reads the full body so the response can be shared.
    async fn send(&self, call: &Call, token: Option<&Secret<String>>) -> Result<Response> {
        let mut headers = call.options.headers.clone();
        headers.remove(AUTHORIZATION);
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                .map_err(|_| Error::Store("stored access token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self
            .client
            .request(call.method.clone(), self.config.url_for(&call.path))
            .headers(headers)
            .timeout(self.config.timeout());
        if !call.options.params.is_empty() {
            builder = builder.query(&call.options.params);
        }
        if let Some(body) = &call.options.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Err(self.network_failure(call, e)),
        };
        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Err(self.network_failure(call, e)),
        };

        self.breaker.record_success();
        debug!(status = status.as_u16(), attempt = call.attempt, "backend responded");
        Ok(Response::new(status, headers, body))
    }

    fn network_failure(&self, call: &Call, err: reqwest::Error) -> Error {
        match classify_transport_error(&err) {
            Some(kind) => {
                self.breaker.record_failure();
                metrics::record_network_error(kind.label());
                warn!(error = %err, error_type = kind.label(), attempt = call.attempt, "backend unreachable");
                Error::Unavailable(format!("{}: {err}", kind.label()))
            }
            None => Error::InvalidRequest(err.to_string()),
        }
    }
}
