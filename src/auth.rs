//! Session authentication seam.
//!
//! The backend session (login, refresh) is someone else's system; the
//! core only ever asks for the current bearer token. `None` means not
//! authenticated; callers refuse to record or verify and surface a
//! status message instead of failing a request.

use std::sync::{Arc, Mutex};

/// Provides the current access token, if any.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Fixed token, e.g. supplied via environment at startup.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider that is never authenticated.
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    /// Reads `VOXGATE_TOKEN`; absent or empty means anonymous.
    pub fn from_env() -> Self {
        match std::env::var("VOXGATE_TOKEN") {
            Ok(token) if !token.is_empty() => Self::new(token),
            _ => Self::anonymous(),
        }
    }
}

impl AccessTokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Mutable token holder for sessions whose token rotates while running.
#[derive(Debug, Clone, Default)]
pub struct SharedTokenProvider {
    token: Arc<Mutex<Option<String>>>,
}

impl SharedTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = token;
        }
    }
}

impl AccessTokenProvider for SharedTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }
}
