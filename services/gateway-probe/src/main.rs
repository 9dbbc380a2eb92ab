//! Gateway probe
//!
//! Makes one call through the resilient gateway and prints the outcome.
//! Useful for checking a config file, a stored session, or how the gateway
//! reacts to an unreachable backend.

mod args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use http_gateway::{
    Config, Error, FileTokenStore, HttpGateway, MemoryTokenStore, Response, SessionEnded,
    TokenStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // JSON logs on stderr; stdout carries the response
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = args::parse(&argv)?;

    let prometheus = if args.metrics {
        Some(install_recorder()?)
    } else {
        None
    };

    let config_path = Config::resolve_path(args.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store: Arc<dyn TokenStore> = match &config.auth.token_file {
        Some(path) => Arc::new(
            FileTokenStore::load(path.clone())
                .await
                .with_context(|| format!("failed to open token file {}", path.display()))?,
        ),
        None => Arc::new(MemoryTokenStore::default()),
    };

    info!(
        base_url = %config.gateway.base_url,
        timeout_secs = config.gateway.timeout_secs,
        failure_threshold = config.breaker.failure_threshold,
        "configuration loaded"
    );

    let gateway = HttpGateway::new(config, store).context("failed to build gateway")?;

    let mut events = gateway.subscribe_session_events();

    let outcome = gateway
        .request(args.method.clone(), &args.path, args.options)
        .await;

    // Events are sent before the failing call returns.
    log_session_events(&mut events);

    let code = match outcome {
        Ok(response) => {
            print_response(&response);
            ExitCode::SUCCESS
        }
        Err(Error::Application(response)) => {
            print_response(&response);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, method = %args.method, path = %args.path, "call failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    };

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }
    Ok(code)
}

/// Log every session-ended event already delivered. Returns how many.
fn log_session_events(events: &mut broadcast::Receiver<SessionEnded>) -> usize {
    let mut logged = 0;
    while let Ok(event) = events.try_recv() {
        info!(
            surface = event.surface.label(),
            reason = event.reason.label(),
            "session ended, sign in again"
        );
        logged += 1;
    }
    logged
}

fn print_response(response: &Response) {
    println!("{}", response.status());
    println!("{}", response.text());
}

fn install_recorder() -> Result<PrometheusHandle> {
    let recorder = http_gateway::metrics::prometheus_builder()
        .context("failed to configure histogram buckets")?
        .build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|_| anyhow::anyhow!("a global metrics recorder is already installed"))?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_gateway::{LoginSurface, SessionEndReason};

    #[test]
    fn session_events_sent_before_drain_are_all_logged() {
        let (tx, mut rx) = broadcast::channel(4);
        let event = SessionEnded {
            surface: LoginSurface::General,
            reason: SessionEndReason::RefreshRejected,
        };
        tx.send(event).unwrap();

        assert_eq!(log_session_events(&mut rx), 1);
        assert_eq!(log_session_events(&mut rx), 0);
    }
}
