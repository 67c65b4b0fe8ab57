//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `Session` - panel visitor, from an HS256 session token (guest if absent)
//! - `AdminAuth` - admin authentication for the ledger endpoints

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use flux_core::AccountId;

use crate::config::LEVEL_ANYONE;
use crate::error::ApiError;
use crate::state::AppState;

/// The visitor behind a panel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    account_id: Option<AccountId>,
    level: i32,
}

impl Session {
    /// A visitor who is not logged in.
    #[must_use]
    pub const fn guest() -> Self {
        Self {
            account_id: None,
            level: LEVEL_ANYONE,
        }
    }

    /// A logged-in account with its group level.
    #[must_use]
    pub const fn logged_in(account_id: AccountId, level: i32) -> Self {
        Self {
            account_id: Some(account_id),
            level,
        }
    }

    /// Whether the visitor is logged in.
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.account_id.is_some()
    }

    /// The logged-in account, if any.
    #[must_use]
    pub const fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    /// Account level; guests have the lowest level.
    #[must_use]
    pub const fn level(&self) -> i32 {
        self.level
    }

    /// Decode a session token, falling back to a guest session.
    #[must_use]
    pub fn from_token(token: &str, secret: &str) -> Self {
        let validation = Validation::new(Algorithm::HS256);
        let claims = match decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "Session token rejected");
                return Self::guest();
            }
        };

        match claims.sub.parse::<AccountId>() {
            Ok(account_id) => Self::logged_in(account_id, claims.level),
            Err(_) => {
                tracing::debug!(sub = %claims.sub, "Session token subject is not an account id");
                Self::guest()
            }
        }
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (account ID).
    pub sub: String,
    /// Account group level.
    pub level: i32,
    /// Expiration time.
    pub exp: i64,
}

impl SessionClaims {
    /// Claims for an account, expiring after `ttl`.
    #[must_use]
    pub fn new(account_id: AccountId, level: i32, ttl: Duration) -> Self {
        Self {
            sub: account_id.to_string(),
            level,
            exp: (Utc::now() + ttl).timestamp(),
        }
    }

    /// Sign the claims into an HS256 token.
    pub fn encode(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::new(Algorithm::HS256),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.session_secret.as_deref() else {
            return Ok(Self::guest());
        };

        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        Ok(token.map_or_else(Self::guest, |token| Self::from_token(token, secret)))
    }
}

/// Admin authentication via API key.
///
/// Requires the `X-Admin-Key` header to match the configured admin key.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let admin_key = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        if !constant_time_eq(admin_key, expected_key) {
            return Err(ApiError::Unauthorized);
        }

        let admin_id = parts
            .headers
            .get("x-admin-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("admin")
            .to_string();

        tracing::info!(admin_id = %admin_id, "Admin authenticated");

        Ok(AdminAuth { admin_id })
    }
}

/// Compare two strings without short-circuiting on the first difference.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "session-secret";

    fn account() -> AccountId {
        AccountId::new(2_000_001).unwrap()
    }

    #[test]
    fn valid_token_yields_logged_in_session() {
        let token = SessionClaims::new(account(), 99, Duration::hours(1))
            .encode(SECRET)
            .unwrap();

        let session = Session::from_token(&token, SECRET);

        assert!(session.is_logged_in());
        assert_eq!(session.account_id(), Some(account()));
        assert_eq!(session.level(), 99);
    }

    #[test]
    fn wrong_secret_yields_guest() {
        let token = SessionClaims::new(account(), 0, Duration::hours(1))
            .encode("other-secret")
            .unwrap();

        assert_eq!(Session::from_token(&token, SECRET), Session::guest());
    }

    #[test]
    fn expired_token_yields_guest() {
        let token = SessionClaims::new(account(), 0, Duration::hours(-2))
            .encode(SECRET)
            .unwrap();

        assert_eq!(Session::from_token(&token, SECRET), Session::guest());
    }

    #[test]
    fn garbage_token_yields_guest() {
        let session = Session::from_token("not-a-jwt", SECRET);
        assert!(!session.is_logged_in());
        assert_eq!(session.level(), LEVEL_ANYONE);
    }

    #[test]
    fn constant_time_eq_matches_equality() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }
}
