//! Session boundary
//!
//! Every endpoint except health asks a [`SessionValidator`] first. An invalid
//! session short-circuits before any path, argument or policy check runs.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

const CONTAINER_ID_HEADER: &str = "x-container-id";

/// Identity attached to an authenticated request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub container_id: Option<String>,
}

pub trait SessionValidator: Send + Sync {
    fn validate_session_for_request(&self, headers: &HeaderMap) -> (bool, Option<Session>);
}

/// Accepts requests carrying one shared secret
///
/// The secret may arrive as `Authorization: Bearer <secret>` or `X-API-Key`.
/// With no secret configured nothing is accepted.
pub struct SharedSecretValidator {
    secret: Option<String>,
}

impl SharedSecretValidator {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }
}

impl SessionValidator for SharedSecretValidator {
    fn validate_session_for_request(&self, headers: &HeaderMap) -> (bool, Option<Session>) {
        let Some(secret) = &self.secret else {
            return (false, None);
        };
        let Some(presented) = extract_token(headers) else {
            return (false, None);
        };

        let matches: bool = presented.as_bytes().ct_eq(secret.as_bytes()).into();
        if !matches {
            return (false, None);
        }

        let container_id = headers
            .get(CONTAINER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        (true, Some(Session { container_id }))
    }
}

fn extract_token(headers: &HeaderMap) -> Option<&str> {
    // 1. Authorization: Bearer <token>
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim());
        }
    }

    // 2. X-API-Key header
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}
