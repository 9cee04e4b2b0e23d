use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, error};

use smt_types::api::{Claims, Identity};

use crate::error::ApiError;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "smt_session";

/// Default session lifetime: one hour.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Issues session tokens and resolves requests back to an [`Identity`].
#[derive(Clone)]
pub struct SessionGate {
    secret: String,
    ttl_secs: u64,
}

impl SessionGate {
    pub fn new(secret: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    pub fn issue(&self, user_id: i64, username: &str) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::seconds(self.ttl_secs as i64)).timestamp()
                as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| {
            error!("Failed to sign session token: {}", e);
            ApiError::Internal
        })
    }

    /// Validate a token (signature and expiry).
    pub fn verify(&self, token: &str) -> Result<Identity, ApiError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!("Rejected session token: {}", e);
            ApiError::Unauthorized
        })?;

        if data.claims.username.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        Ok(Identity::from(data.claims))
    }

    /// Resolve a request from `Authorization: Bearer` or, failing that, the
    /// session cookie.
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or(ApiError::Unauthorized)?;
            return self.verify(token);
        }

        let jar = CookieJar::from_headers(headers);
        let cookie = jar.get(SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
        self.verify(cookie.value())
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build()
    }

    pub fn clear_cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE).path("/").build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate() -> SessionGate {
        SessionGate::new("test-secret", DEFAULT_SESSION_TTL_SECS)
    }

    #[test]
    fn bearer_and_cookie_resolve_to_the_same_identity() {
        let gate = gate();
        let token = gate.issue(4, "alice").unwrap();

        let mut bearer = HeaderMap::new();
        bearer.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let mut cookie = HeaderMap::new();
        cookie.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, token)).unwrap(),
        );

        let expected = Identity {
            user_id: 4,
            username: "alice".into(),
        };
        assert_eq!(gate.resolve(&bearer).unwrap(), expected);
        assert_eq!(gate.resolve(&cookie).unwrap(), expected);
    }

    #[test]
    fn missing_or_foreign_tokens_are_unauthorized() {
        let gate = gate();
        assert!(matches!(gate.resolve(&HeaderMap::new()), Err(ApiError::Unauthorized)));

        let other = SessionGate::new("other-secret", DEFAULT_SESSION_TTL_SECS);
        let token = other.issue(1, "mallory").unwrap();
        assert!(matches!(gate.verify(&token), Err(ApiError::Unauthorized)));
        assert!(matches!(gate.verify("garbage"), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let gate = gate();
        let claims = Claims {
            sub: 1,
            username: "alice".into(),
            exp: (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(gate.verify(&token), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn malformed_authorization_header_is_unauthorized() {
        let gate = gate();
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(gate.resolve(&headers), Err(ApiError::Unauthorized)));
    }
}
