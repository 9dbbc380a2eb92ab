//! Session-ended signal
//!
//! Emitted when no usable credentials remain. The UI layer subscribes and
//! routes the user to the login surface named in the event.

use std::fmt;

/// Which login page the user should be sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSurface {
    General,
    Admin,
}

impl LoginSurface {
    pub fn label(&self) -> &'static str {
        match self {
            LoginSurface::General => "general",
            LoginSurface::Admin => "admin",
        }
    }
}

/// Why the session could not be kept alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// No refresh token was stored, so no refresh was attempted.
    NoRefreshToken,
    /// The backend refused the refresh token.
    RefreshRejected,
}

impl SessionEndReason {
    pub fn label(&self) -> &'static str {
        match self {
            SessionEndReason::NoRefreshToken => "no_refresh_token",
            SessionEndReason::RefreshRejected => "refresh_rejected",
        }
    }
}

/// Terminal end of a session. Tokens have already been cleared when this is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnded {
    pub surface: LoginSurface,
    pub reason: SessionEndReason,
}

impl fmt::Display for SessionEnded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session expired ({}), sign in again via the {} login",
            self.reason.label(),
            self.surface.label()
        )
    }
}
