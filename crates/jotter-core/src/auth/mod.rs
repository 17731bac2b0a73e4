//! Session contract consumed by the sync engine.
//!
//! Login flows live with the auth provider; the engine only needs to know
//! whether a usable bearer token exists right now and when that changes.

use std::fmt;

use tokio::sync::watch;

use crate::util::unix_millis_now;

const EXPIRY_SKEW_MS: i64 = 60_000;

/// Bearer token for the remote API
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    token: String,
    /// Expiry (Unix ms); `None` never expires
    expires_at: Option<i64>,
}

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    #[must_use]
    pub const fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= unix_millis_now() + EXPIRY_SKEW_MS)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of the current session
pub trait SessionProvider: Send + Sync {
    /// The usable token, or `None` while signed out or expired
    fn current(&self) -> Option<SessionToken>;

    /// Called when the remote rejected the token
    fn invalidate(&self) {}

    /// Change notifications, for providers whose session can come back
    fn watch(&self) -> Option<watch::Receiver<Option<SessionToken>>> {
        None
    }
}

/// Fixed session, e.g. a token read from the environment at startup
#[derive(Debug, Clone)]
pub struct StaticSession {
    token: Option<SessionToken>,
}

impl StaticSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(SessionToken::new(token)),
        }
    }

    pub const fn signed_out() -> Self {
        Self { token: None }
    }
}

impl SessionProvider for StaticSession {
    fn current(&self) -> Option<SessionToken> {
        self.token.clone().filter(|token| !token.is_expired())
    }
}

/// Session that can be replaced at runtime (sign-in, refresh, sign-out)
#[derive(Debug, Clone)]
pub struct SharedSession {
    tx: watch::Sender<Option<SessionToken>>,
}

impl SharedSession {
    pub fn new(initial: Option<SessionToken>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Install a fresh token; paused sync resumes
    pub fn set(&self, token: SessionToken) {
        self.tx.send_replace(Some(token));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for SharedSession {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionProvider for SharedSession {
    fn current(&self) -> Option<SessionToken> {
        self.tx.borrow().clone().filter(|token| !token.is_expired())
    }

    fn invalidate(&self) {
        tracing::warn!("Remote rejected session token; pausing sync until reauthentication");
        self.clear();
    }

    fn watch(&self) -> Option<watch::Receiver<Option<SessionToken>>> {
        Some(self.tx.subscribe())
    }
}
