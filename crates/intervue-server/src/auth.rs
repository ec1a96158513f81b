//! Bearer-token verification.
//!
//! Tokens are opaque strings mapped to a user and an expiry. Issuing tokens
//! to real users is handled elsewhere; the server only verifies them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// The verified caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Authenticated user.
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
struct Grant {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// Verifies opaque bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    grants: Arc<RwLock<HashMap<String, Grant>>>,
}

impl Authenticator {
    /// Creates an authenticator with no valid tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a random token for `user_id`, valid for `ttl`.
    pub async fn issue(&self, user_id: Uuid, ttl: Duration) -> String {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.register(token.clone(), user_id, Utc::now() + ttl).await;
        token
    }

    /// Accepts a caller-chosen token until `expires_at`.
    pub async fn register(&self, token: impl Into<String>, user_id: Uuid, expires_at: DateTime<Utc>) {
        self.grants
            .write()
            .await
            .insert(token.into(), Grant { user_id, expires_at });
    }

    /// Stops accepting `token`.
    pub async fn revoke(&self, token: &str) {
        self.grants.write().await.remove(token);
    }

    /// Resolves a token to an identity. Unknown and expired tokens yield `None`.
    pub async fn verify(&self, token: &str) -> Option<Identity> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let grants = self.grants.read().await;
        let grant = grants.get(token)?;
        if grant.expires_at <= Utc::now() {
            debug!(user_id = %grant.user_id, "Rejected expired token");
            return None;
        }
        Some(Identity {
            user_id: grant.user_id,
        })
    }

    /// Verifies each candidate in order and returns the first identity
    /// that checks out.
    pub async fn verify_any<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a str>,
    ) -> Option<Identity> {
        for token in candidates {
            if let Some(identity) = self.verify(token).await {
                return Some(identity);
            }
        }
        None
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// Extracts `access_token` from a `Cookie` header value.
#[must_use]
pub fn cookie_token(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "access_token")
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}
