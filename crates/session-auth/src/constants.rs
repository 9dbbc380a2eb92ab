//! Fixed names and defaults for the session token lifecycle

/// Storage key for the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Default backend path that exchanges a refresh token for a new access token.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Default login endpoints. A 401 from these means bad credentials, not an
/// expired session, so they never trigger a refresh.
pub const DEFAULT_LOGIN_PATHS: &[&str] = &["/auth/login", "/admin/login"];
