//! Command-line parsing
//!
//! `gateway-probe [--config PATH] [--body JSON] [--metrics] METHOD PATH [key=value ...]`

use anyhow::{Context, Result, bail};
use http_gateway::{Method, RequestOptions};

pub const USAGE: &str =
    "usage: gateway-probe [--config PATH] [--body JSON] [--metrics] METHOD PATH [key=value ...]";

#[derive(Debug)]
pub struct Args {
    pub config_path: Option<String>,
    pub method: Method,
    pub path: String,
    pub options: RequestOptions,
    /// Print Prometheus metrics to stderr after the call.
    pub metrics: bool,
}

pub fn parse(args: &[String]) -> Result<Args> {
    let mut config_path = None;
    let mut body = None;
    let mut metrics = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(iter.next().context("--config needs a path")?.clone());
            }
            "--body" => {
                let raw = iter.next().context("--body needs a JSON value")?;
                let value: serde_json::Value =
                    serde_json::from_str(raw).context("--body is not valid JSON")?;
                body = Some(value);
            }
            "--metrics" => metrics = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ => positional.push(arg.as_str()),
        }
    }

    let [method, path, params @ ..] = positional.as_slice() else {
        bail!("METHOD and PATH are required\n{USAGE}");
    };
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {method}"))?;

    let mut options = RequestOptions::new();
    for param in params {
        let (key, value) = param
            .split_once('=')
            .with_context(|| format!("query parameter must be key=value, got: {param}"))?;
        options = options.param(key, value);
    }
    if let Some(body) = body {
        options = options.json(body);
    }

    Ok(Args {
        config_path,
        method,
        path: path.to_string(),
        options,
        metrics,
    })
}
