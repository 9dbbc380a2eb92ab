//! Token storage for the access/refresh credential pair
//!
//! `TokenStore` is the only place credentials live. The gateway reads the
//! access token right before each send and writes through the store after a
//! refresh, so no other component keeps a copy beyond a single header value.
//!
//! Two implementations: `MemoryTokenStore` for tests and short-lived tools,
//! and `FileTokenStore`, a durable JSON file holding two strings under fixed
//! key names. File writes use atomic temp-file + rename so a crash never
//! leaves a half-written token file behind.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::{Error, Result};

/// Boxed future returned by `TokenStore` methods (keeps the trait dyn-compatible).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The access/refresh token pair. Either half may be absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access: Option<Secret<String>>,
    pub refresh: Option<Secret<String>>,
}

impl Credentials {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(Secret::new(access.into())),
            refresh: Some(Secret::new(refresh.into())),
        }
    }

    /// Only an access token, e.g. a login that issued no refresh token.
    pub fn access_only(access: impl Into<String>) -> Self {
        Self {
            access: Some(Secret::new(access.into())),
            refresh: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }

    fn to_map(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        if let Some(access) = &self.access {
            map.insert(ACCESS_TOKEN_KEY, access.expose().clone());
        }
        if let Some(refresh) = &self.refresh {
            map.insert(REFRESH_TOKEN_KEY, refresh.expose().clone());
        }
        map
    }

    fn from_map(mut map: HashMap<String, String>) -> Self {
        Self {
            access: map.remove(ACCESS_TOKEN_KEY).map(Secret::new),
            refresh: map.remove(REFRESH_TOKEN_KEY).map(Secret::new),
        }
    }
}

/// Storage for the credential pair. No validation of token shape.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenStore>`).
pub trait TokenStore: Send + Sync {
    /// Current credentials (both halves may be `None`).
    fn get(&self) -> StoreFuture<'_, Credentials>;

    /// Replace the stored credentials.
    fn set(&self, credentials: Credentials) -> StoreFuture<'_, Result<()>>;

    /// Forget both tokens. Cleared tokens are unrecoverable.
    fn clear(&self) -> StoreFuture<'_, Result<()>>;
}

/// In-process token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    state: Mutex<Credentials>,
}

impl MemoryTokenStore {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            state: Mutex::new(credentials),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> StoreFuture<'_, Credentials> {
        Box::pin(async move { self.state.lock().await.clone() })
    }

    fn set(&self, credentials: Credentials) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await = credentials;
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await = Credentials::default();
            Ok(())
        })
    }
}

/// Durable token file.
///
/// The Mutex serializes writes and is held across the disk write, so two
/// concurrent `set` calls can never interleave their temp files.
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<Credentials>,
}

impl FileTokenStore {
    /// Load tokens from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (no session yet).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token file: {e}")))?;
            let map: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing token file: {e}")))?;
            let credentials = Credentials::from_map(map);
            info!(
                path = %path.display(),
                has_access = credentials.access.is_some(),
                has_refresh = credentials.refresh.is_some(),
                "loaded session tokens"
            );
            credentials
        } else {
            info!(path = %path.display(), "token file not found, starting without a session");
            let credentials = Credentials::default();
            write_atomic(&path, &credentials).await?;
            credentials
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> StoreFuture<'_, Credentials> {
        Box::pin(async move { self.state.lock().await.clone() })
    }

    fn set(&self, credentials: Credentials) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            write_atomic(&self.path, &credentials).await?;
            *state = credentials;
            debug!("stored session tokens");
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let empty = Credentials::default();
            write_atomic(&self.path, &empty).await?;
            *state = empty;
            debug!("cleared session tokens");
            Ok(())
        })
    }
}

/// Write tokens to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets permissions to 0600 since the file holds bearer tokens.
async fn write_atomic(path: &Path, credentials: &Credentials) -> Result<()> {
    let json = serde_json::to_string_pretty(&credentials.to_map())
        .map_err(|e| Error::Parse(format!("serializing tokens: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted tokens");
    Ok(())
}
