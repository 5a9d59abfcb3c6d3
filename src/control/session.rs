//! Operator sessions for the control panel.
//!
//! Sessions are opaque random tokens held server-side; the cookie carries
//! only the token. Logging out removes the token, which invalidates the
//! cookie everywhere at once.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use super::ControlState;

pub const COOKIE_NAME: &str = "subwatch_session";

/// Issues, checks and revokes session tokens.
pub trait SessionStore: Send + Sync {
    fn create(&self) -> String;
    fn is_valid(&self, token: &str) -> bool;
    fn revoke(&self, token: &str);
}

/// Process-local session set.
#[derive(Debug, Default)]
pub struct InMemorySessions {
    tokens: Mutex<HashSet<String>>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessions {
    fn create(&self) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone());
        token
    }

    fn is_valid(&self, token: &str) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }

    fn revoke(&self, token: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }
}

/// Constant-time comparison so the password check leaks no timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Set-Cookie value for a fresh session.
pub fn session_cookie(token: &str) -> String {
    format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict")
}

/// Set-Cookie value that removes the session cookie.
pub fn clear_session_cookie() -> String {
    format!("{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

/// Session token from the request's Cookie header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|h| h.split(';'))
        .find_map(|part| {
            part.trim()
                .strip_prefix(COOKIE_NAME)
                .and_then(|rest| rest.strip_prefix('='))
        })
        .filter(|t| !t.is_empty())
}

/// A request carrying a valid session. Handlers that need a logged-in
/// operator take this; anyone else is redirected to the login page.
pub struct OperatorSession {
    pub token: String,
}

impl FromRequestParts<Arc<ControlState>> for OperatorSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ControlState>,
    ) -> Result<Self, Self::Rejection> {
        match session_token(&parts.headers) {
            Some(token) if state.sessions.is_valid(token) => Ok(OperatorSession {
                token: token.to_string(),
            }),
            _ => Err(Redirect::to("/").into_response()),
        }
    }
}
