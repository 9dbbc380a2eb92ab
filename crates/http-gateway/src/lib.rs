//! Resilient HTTP gateway for the marketplace backend
//!
//! `HttpGateway` is the one entry point UI code uses to talk to the backend.
//! It attaches the session token, collapses duplicate calls, stops calling
//! an unreachable backend, and refreshes an expired access token
//! transparently. Callers see three kinds of failure: the server is
//! unavailable, the session has ended, or the backend answered with an
//! error status.
//!
//! ```no_run
//! # async fn demo() -> http_gateway::Result<()> {
//! use std::sync::Arc;
//! use http_gateway::{Config, HttpGateway};
//! use session_auth::MemoryTokenStore;
//!
//! let store = Arc::new(MemoryTokenStore::default());
//! let gateway = HttpGateway::new(Config::new("https://api.marketplace.test"), store)?;
//! let categories = gateway.get("/categories").await?;
//! println!("{}", categories.text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod request;
pub mod response;

pub use config::Config;
pub use error::{Error, Result};
pub use gateway::HttpGateway;
pub use request::RequestOptions;
pub use response::Response;

pub use reqwest::Method;
pub use resilience::{BreakerState, LoginSurface, SessionEndReason, SessionEnded};
pub use session_auth::{Credentials, FileTokenStore, MemoryTokenStore, TokenStore};
