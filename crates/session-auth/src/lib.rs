//! Session token storage and refresh
//!
//! Holds the access/refresh token pair behind the `TokenStore` trait and
//! talks to the backend's refresh endpoint. This crate knows nothing about
//! deduplication, circuit breaking or retries; the resilience and gateway
//! crates build those on top.
//!
//! Token flow:
//! 1. A login call succeeds and the gateway stores the pair via `TokenStore::set()`
//! 2. Each outbound call reads the access token via `TokenStore::get()`
//! 3. On 401 the refresh coordinator calls `token::refresh_access_token()`
//! 4. The new access token is written back via `TokenStore::set()`
//! 5. A rejected refresh ends the session via `TokenStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{Credentials, FileTokenStore, MemoryTokenStore, StoreFuture, TokenStore};
pub use error::{Error, Result};
pub use token::{TokenResponse, refresh_access_token};
