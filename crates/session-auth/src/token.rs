//! Refresh endpoint client
//!
//! POSTs the stored refresh token to the backend and parses the new access
//! token. Failures are split into transport errors (the backend could not be
//! reached or failed server-side, tokens stay valid) and rejections (the
//! refresh token is dead and the session must end).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Statuses that mean the refresh token itself is dead.
const REJECTING_STATUSES: &[u16] = &[400, 401, 403];

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// Response from the refresh endpoint.
///
/// The backend may rotate the refresh token; when it doesn't, the caller
/// keeps the one it already has.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken", alias = "access", alias = "access_token")]
    pub access_token: String,
    #[serde(
        rename = "refreshToken",
        alias = "refresh",
        alias = "refresh_token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
}

/// Exchange a refresh token for a new access token.
///
/// `url` is the absolute refresh endpoint. The call carries its own
/// `timeout`; expiry is reported as `Error::Network`.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    url: &str,
    refresh: &str,
    timeout: Duration,
) -> Result<TokenResponse> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(&RefreshRequest {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| Error::Network(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        let status = status.as_u16();
        return Err(if REJECTING_STATUSES.contains(&status) {
            Error::Rejected { status, body }
        } else {
            Error::Server { status, body }
        });
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))?;

    if token.access_token.is_empty() {
        return Err(Error::InvalidResponse(
            "refresh response carried an empty access token".into(),
        ));
    }
    Ok(token)
}
