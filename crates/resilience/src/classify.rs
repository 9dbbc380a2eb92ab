//! Failure classification for outbound calls
//!
//! Separates transport failures, which feed the circuit breaker, from HTTP
//! statuses, which prove the backend is reachable. Only a 401 gets special
//! treatment; every other status is handed back to the caller untouched.

/// How the gateway treats a completed HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx
    Success,
    /// 401: the access token may be stale, try a refresh
    AuthExpired,
    /// Any other status: passed through verbatim
    Application,
}

/// Classify an HTTP status code.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 => StatusClass::AuthExpired,
        _ => StatusClass::Application,
    }
}

/// Transport-level failure kinds. All of them count against the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    Timeout,
    Connect,
    Transport,
}

impl NetworkFailure {
    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            NetworkFailure::Timeout => "timeout",
            NetworkFailure::Connect => "connect",
            NetworkFailure::Transport => "transport",
        }
    }
}

/// Classify a `reqwest` error as a network-class failure.
///
/// Returns `None` for errors that are the caller's fault (bad URL, body that
/// cannot be encoded) or that happen after a response arrived (decoding);
/// those must not open the breaker.
pub fn classify_transport_error(err: &reqwest::Error) -> Option<NetworkFailure> {
    if err.is_timeout() {
        Some(NetworkFailure::Timeout)
    } else if err.is_connect() {
        Some(NetworkFailure::Connect)
    } else if err.is_request() || err.is_body() {
        Some(NetworkFailure::Transport)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn classify_status_2xx_success() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(201), StatusClass::Success);
        assert_eq!(classify_status(204), StatusClass::Success);
    }

    #[test]
    fn classify_status_401_auth_expired() {
        assert_eq!(classify_status(401), StatusClass::AuthExpired);
    }

    #[test]
    fn classify_status_other_errors_pass_through() {
        for status in [400, 403, 404, 409, 422, 429, 500, 502, 503, 504] {
            assert_eq!(
                classify_status(status),
                StatusClass::Application,
                "status {status}"
            );
        }
    }

    #[test]
    fn classify_status_redirect_passes_through() {
        assert_eq!(classify_status(304), StatusClass::Application);
    }

    #[tokio::test]
    async fn refused_connection_is_connect_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::new()
            .get(format!("http://{addr}/categories"))
            .send()
            .await
            .unwrap_err();
        assert_eq!(classify_transport_error(&err), Some(NetworkFailure::Connect));
    }

    #[tokio::test]
    async fn slow_backend_is_timeout_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = reqwest::Client::new()
            .get(format!("{}/categories", server.uri()))
            .timeout(Duration::from_millis(50))
            .send()
            .await
            .unwrap_err();
        assert_eq!(classify_transport_error(&err), Some(NetworkFailure::Timeout));
    }

    #[tokio::test]
    async fn malformed_url_is_not_network_class() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        assert_eq!(classify_transport_error(&err), None);
    }

    #[test]
    fn labels() {
        assert_eq!(NetworkFailure::Timeout.label(), "timeout");
        assert_eq!(NetworkFailure::Connect.label(), "connect");
        assert_eq!(NetworkFailure::Transport.label(), "transport");
    }
}
