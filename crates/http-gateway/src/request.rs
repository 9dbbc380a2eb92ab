//! Call options and the prepared call passed through the pipeline

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use resilience::LoginSurface;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};

/// Per-call options. Everything is optional; `Default` is a bare call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters. Ordered so the dedup key is canonical.
    pub params: BTreeMap<String, String>,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Extra headers. `Authorization` is always replaced by the gateway.
    pub headers: HeaderMap,
    /// Force deduplication on or off for this call.
    pub dedupe: Option<bool>,
    /// Override the login surface derived from the path.
    pub login_surface: Option<LoginSurface>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn try_json<T: Serialize>(self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::InvalidRequest(format!("body is not serializable: {e}")))?;
        Ok(self.json(value))
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn dedupe(mut self, enabled: bool) -> Self {
        self.dedupe = Some(enabled);
        self
    }

    pub fn login_surface(mut self, surface: LoginSurface) -> Self {
        self.login_surface = Some(surface);
        self
    }
}

/// A validated call. Retries are new values with a higher `attempt`;
/// the original is never mutated.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub method: Method,
    pub path: String,
    pub options: RequestOptions,
    pub surface: LoginSurface,
    /// Login or refresh endpoint: a 401 here is never refreshed.
    pub auth_endpoint: bool,
    pub attempt: u8,
    pub request_id: String,
}

impl Call {
    pub fn new(method: Method, path: &str, options: RequestOptions, config: &Config) -> Result<Self> {
        if !path.starts_with('/') {
            return Err(Error::InvalidRequest(format!(
                "path must start with '/', got: {path}"
            )));
        }
        if path.contains('?') {
            return Err(Error::InvalidRequest(
                "query strings go in RequestOptions::params".into(),
            ));
        }

        let surface = options
            .login_surface
            .unwrap_or_else(|| config.surface_for(path));
        Ok(Self {
            auth_endpoint: config.is_auth_path(path),
            method,
            path: path.to_string(),
            options,
            surface,
            attempt: 0,
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
        })
    }

    /// The single post-refresh resend.
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Whether a 401 on this call may trigger a refresh.
    pub fn may_refresh(&self) -> bool {
        !self.auth_endpoint && self.attempt == 0
    }

    /// Key identifying identical calls, or `None` if this call must always
    /// reach the network.
    ///
    /// Params are percent-encoded so a value containing `&` or `=` can
    /// never alias a different parameter set.
    ///
    /// Safe methods collapse by default. Mutations collapse only when
    /// `collapse_mutations` is set, and their key includes a digest of the
    /// body so different payloads never share a call.
    pub fn dedup_key(&self, collapse_mutations: bool) -> Option<String> {
        let safe = is_safe(&self.method);
        if !self.options.dedupe.unwrap_or(safe || collapse_mutations) {
            return None;
        }

        let mut key = format!("{} {}", self.method, self.path);
        if !self.options.params.is_empty() {
            let query: Vec<String> = self
                .options
                .params
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        utf8_percent_encode(k, NON_ALPHANUMERIC),
                        utf8_percent_encode(v, NON_ALPHANUMERIC)
                    )
                })
                .collect();
            key.push('?');
            key.push_str(&query.join("&"));
        }
        if !safe && let Some(body) = &self.options.body {
            key.push('#');
            key.push_str(&body_digest(body));
        }
        Some(key)
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// SHA-256 of the compact JSON encoding. Object keys serialize sorted, so
/// equal values always hash equal.
fn body_digest(body: &serde_json::Value) -> String {
    let digest = Sha256::digest(body.to_string().as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
