//! Authentication and authorization utilities
//!
//! Provides:
//! - JWT token generation and validation
//! - Password hashing and verification (argon2)
//! - OTP generation and expiry checks
//! - Authenticated-user extraction for handlers

use crate::errors::{AppError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Extracted authentication context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Authenticated user email
    pub email: String,
}

/// Optional authentication for routes serving both anonymous and
/// authenticated traffic.
///
/// A missing Authorization header yields `None`; a present but invalid
/// one is rejected rather than silently downgraded to anonymous.
#[derive(Debug, Clone)]
pub struct MaybeAuthContext(pub Option<AuthContext>);

impl MaybeAuthContext {
    /// The authenticated user ID, if any
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|ctx| ctx.user_id)
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// User email
    pub email: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new JWT token for a user
    pub fn generate_token(&self, user_id: Uuid, email: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }
}

impl TryFrom<JwtClaims> for AuthContext {
    type Error = AppError;

    fn try_from(claims: JwtClaims) -> Result<Self> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;
        Ok(AuthContext {
            user_id,
            email: claims.email,
        })
    }
}

/// Hash a password with a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Generate a 6-digit numeric OTP
pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", code)
}

/// Check whether an OTP issued at `issued_at` is still inside its
/// validity window at `now`. The boundary itself counts as valid.
pub fn otp_is_fresh(issued_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - issued_at <= ttl
}

/// Extract a bearer token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

fn bearer_from_parts(parts: &Parts) -> Result<Option<&str>> {
    let Some(value) = parts.headers.get("authorization") else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| AppError::Unauthorized {
        message: "Malformed Authorization header".to_string(),
    })?;

    extract_bearer(value)
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header must use the Bearer scheme".to_string(),
        })
}

/// Axum extractor for AuthContext (required authentication)
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    Arc<JwtManager>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let token = bearer_from_parts(parts)?.ok_or_else(|| AppError::Unauthorized {
            message: "Missing Authorization header".to_string(),
        })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let claims = jwt.validate_token(token)?;
        AuthContext::try_from(claims)
    }
}

/// Axum extractor for MaybeAuthContext (optional authentication)
impl<S> FromRequestParts<S> for MaybeAuthContext
where
    S: Send + Sync,
    Arc<JwtManager>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Some(token) = bearer_from_parts(parts)? else {
            return Ok(MaybeAuthContext(None));
        };

        let jwt = Arc::<JwtManager>::from_ref(state);
        let claims = jwt.validate_token(token)?;
        Ok(MaybeAuthContext(Some(AuthContext::try_from(claims)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", 1800);

        let user_id = Uuid::new_v4();
        let token = manager.generate_token(user_id, "user@example.com").unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "user@example.com");
        assert!(claims.exp - claims.iat == 1800);
    }

    #[test]
    fn test_jwt_expired() {
        let manager = JwtManager::new("test_secret", 1800);

        // Forge an already-expired token; default validation applies
        // 60 seconds of leeway, so back-date well past it.
        let now = Utc::now();
        let claims = JwtClaims {
            sub: Uuid::new_v4().to_string(),
            email: "user@example.com".to_string(),
            exp: (now - Duration::minutes(5)).timestamp(),
            iat: (now - Duration::minutes(35)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        assert!(matches!(
            manager.validate_token(&token),
            Err(AppError::ExpiredToken)
        ));
    }

    #[test]
    fn test_jwt_wrong_secret() {
        let manager = JwtManager::new("test_secret", 1800);
        let other = JwtManager::new("other_secret", 1800);

        let token = other
            .generate_token(Uuid::new_v4(), "user@example.com")
            .unwrap();
        assert!(matches!(
            manager.validate_token(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2!").unwrap();
        assert_ne!(hash, "hunter2!");
        assert!(verify_password("hunter2!", &hash));
        assert!(!verify_password("hunter3!", &hash));
    }

    #[test]
    fn test_verify_password_garbage_hash() {
        assert!(!verify_password("hunter2!", "not-a-phc-string"));
    }

    #[test]
    fn test_generate_otp_format() {
        for _ in 0..32 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_otp_freshness_window() {
        let ttl = Duration::minutes(10);
        let issued = Utc::now();

        assert!(otp_is_fresh(issued, issued + Duration::seconds(599), ttl));
        // Boundary counts as valid
        assert!(otp_is_fresh(issued, issued + Duration::seconds(600), ttl));
        assert!(!otp_is_fresh(issued, issued + Duration::seconds(601), ttl));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(extract_bearer("abc.def.ghi"), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }
}
