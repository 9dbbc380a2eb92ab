//! Configuration types and loading
//!
//! Precedence: CLI `--config` > `CONFIG_PATH` env > default file name for the
//! path; `GATEWAY_BASE_URL` env overrides `gateway.base_url` from the file.
//! Dedup window, breaker threshold and cooldown are tuning knobs with
//! defaults, not derived values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use resilience::LoginSurface;
use serde::Deserialize;
use session_auth::{DEFAULT_LOGIN_PATHS, DEFAULT_REFRESH_PATH};

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Paths under this prefix end their session on the admin login surface.
    #[serde(default = "default_admin_prefix")]
    pub admin_path_prefix: String,
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

/// Deduplication tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// 0 disables deduplication entirely.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Collapse identical POST/PUT/PATCH/DELETE calls (same body) as well.
    #[serde(default = "default_true")]
    pub collapse_mutations: bool,
}

/// Auth endpoint layout and token persistence
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_paths")]
    pub login_paths: Vec<String>,
    /// Token file for a durable session; in-memory when unset.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    30
}

fn default_admin_prefix() -> String {
    "/admin".into()
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_cooldown() -> u64 {
    60
}

fn default_window_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.into()
}

fn default_login_paths() -> Vec<String> {
    DEFAULT_LOGIN_PATHS.iter().map(|p| p.to_string()).collect()
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            collapse_mutations: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: default_refresh_path(),
            login_paths: default_login_paths(),
            token_file: None,
        }
    }
}

impl Config {
    /// Defaults for everything except the backend URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            gateway: GatewayConfig {
                base_url: base_url.into(),
                timeout_secs: default_timeout(),
                admin_path_prefix: default_admin_prefix(),
            },
            breaker: BreakerConfig::default(),
            dedup: DedupConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("GATEWAY_BASE_URL") {
            config.gateway.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot run with.
    pub fn validate(&self) -> common::Result<()> {
        if !self.gateway.base_url.starts_with("http://")
            && !self.gateway.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.gateway.base_url
            )));
        }

        if self.gateway.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(common::Error::Config(
                "failure_threshold must be greater than 0".into(),
            ));
        }

        if self.breaker.cooldown_secs > resilience::MAX_COOLDOWN.as_secs() {
            return Err(common::Error::Config(format!(
                "cooldown_secs must be at most {}, got: {}",
                resilience::MAX_COOLDOWN.as_secs(),
                self.breaker.cooldown_secs
            )));
        }

        let paths = std::iter::once(&self.auth.refresh_path).chain(&self.auth.login_paths);
        for path in paths {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "auth paths must start with '/', got: {path}"
                )));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("marketplace-gateway.toml")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup.window_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker.cooldown_secs)
    }

    /// Absolute URL for a backend path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.gateway.base_url.trim_end_matches('/'), path)
    }

    /// Login and refresh endpoints: a 401 from these never triggers a refresh.
    pub fn is_auth_path(&self, path: &str) -> bool {
        path == self.auth.refresh_path || self.auth.login_paths.iter().any(|p| p == path)
    }

    /// Login surface for a session that ends while calling `path`.
    pub fn surface_for(&self, path: &str) -> LoginSurface {
        let prefix = &self.gateway.admin_path_prefix;
        if !prefix.is_empty() && path.starts_with(prefix.as_str()) {
            LoginSurface::Admin
        } else {
            LoginSurface::General
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn minimal_toml() -> &'static str {
        r#"
[gateway]
base_url = "https://api.marketplace.test"
"#
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("GATEWAY_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write_config(&dir, minimal_toml())).unwrap();

        assert_eq!(config.gateway.base_url, "https://api.marketplace.test");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.gateway.admin_path_prefix, "/admin");
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.breaker_cooldown(), Duration::from_secs(60));
        assert_eq!(config.dedup_window(), Duration::from_millis(1000));
        assert!(config.dedup.collapse_mutations);
        assert_eq!(config.auth.refresh_path, "/auth/refresh");
        assert_eq!(config.auth.login_paths, vec!["/auth/login", "/admin/login"]);
        assert!(config.auth.token_file.is_none());
    }

    #[test]
    fn full_config_overrides_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("GATEWAY_BASE_URL") };
        let dir = tempfile::tempdir().unwrap();
        let toml = r#"
[gateway]
base_url = "http://localhost:4000/api"
timeout_secs = 10
admin_path_prefix = "/backoffice"

[breaker]
failure_threshold = 3
cooldown_secs = 120

[dedup]
window_ms = 500
collapse_mutations = false

[auth]
refresh_path = "/token/refresh"
login_paths = ["/token"]
token_file = "/var/lib/marketplace/tokens.json"
"#;
        let config = Config::load(&write_config(&dir, toml)).unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker_cooldown(), Duration::from_secs(120));
        assert_eq!(config.dedup_window(), Duration::from_millis(500));
        assert!(!config.dedup.collapse_mutations);
        assert!(config.is_auth_path("/token/refresh"));
        assert!(config.is_auth_path("/token"));
        assert!(!config.is_auth_path("/auth/login"));
        assert_eq!(
            config.auth.token_file,
            Some(PathBuf::from("/var/lib/marketplace/tokens.json"))
        );
        assert_eq!(config.surface_for("/backoffice/users"), LoginSurface::Admin);
    }

    #[test]
    fn base_url_from_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        unsafe { set_env("GATEWAY_BASE_URL", "https://staging.marketplace.test") };
        let config = Config::load(&write_config(&dir, minimal_toml()));
        unsafe { remove_env("GATEWAY_BASE_URL") };

        assert_eq!(
            config.unwrap().gateway.base_url,
            "https://staging.marketplace.test"
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Config::load(Path::new("/nonexistent/path/gateway.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&write_config(&dir, "not valid {{{{ toml"));
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn base_url_without_scheme_rejected() {
        let config = Config::new("api.marketplace.test");
        let err = config.validate().unwrap_err().to_string();
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = Config::new("https://api.marketplace.test");
        config.gateway.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut config = Config::new("https://api.marketplace.test");
        config.breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_cooldown_rejected() {
        let mut config = Config::new("https://api.marketplace.test");
        config.breaker.cooldown_secs = u64::MAX;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cooldown_secs must be at most 86400"), "got: {err}");

        config.breaker.cooldown_secs = 86_400;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relative_auth_path_rejected() {
        let mut config = Config::new("https://api.marketplace.test");
        config.auth.login_paths.push("auth/sso".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn url_for_joins_without_double_slash() {
        let config = Config::new("https://api.marketplace.test/v1/");
        assert_eq!(
            config.url_for("/categories"),
            "https://api.marketplace.test/v1/categories"
        );
    }

    #[test]
    fn surface_follows_admin_prefix() {
        let config = Config::new("https://api.marketplace.test");
        assert_eq!(config.surface_for("/admin/users"), LoginSurface::Admin);
        assert_eq!(config.surface_for("/requests"), LoginSurface::General);

        let mut no_admin = config.clone();
        no_admin.gateway.admin_path_prefix = String::new();
        assert_eq!(no_admin.surface_for("/admin/users"), LoginSurface::General);
    }

    #[test]
    fn resolve_path_precedence() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/gateway.toml") };
        assert_eq!(
            Config::resolve_path(Some("/cli/gateway.toml")),
            PathBuf::from("/cli/gateway.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/env/gateway.toml")
        );
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("marketplace-gateway.toml")
        );
    }
}
