//! Caller identity tokens
//!
//! Tokens are issued by the identity provider; the core only verifies them
//! and reads the subject and role. `issue_token` exists for tooling and tests.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::UserRole;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// JWT claims carried by caller tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User role
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|e| JwtError::InvalidToken(e.to_string()))
    }

    pub fn role(&self) -> Result<UserRole, JwtError> {
        UserRole::parse(&self.role)
            .ok_or_else(|| JwtError::InvalidToken(format!("unknown role '{}'", self.role)))
    }
}

/// Verifies bearer tokens with the configured HS256 secret
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        verify_token(token, &self.secret)
    }
}

/// Issue a signed token for a user
pub fn issue_token(
    user_id: Uuid,
    role: UserRole,
    secret: &str,
    ttl_seconds: i64,
) -> Result<String, JwtError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(ttl_seconds);

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::EncodingFailed(e.to_string()))
}

/// Verify and decode a JWT token
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        _ => JwtError::DecodingFailed(e.to_string()),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify_token() {
        let user_id = Uuid::new_v4();
        let secret = "test-secret-key";

        let token = issue_token(user_id, UserRole::HeadOf, secret, 900).unwrap();
        assert!(!token.is_empty());

        let claims = verify_token(&token, secret).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.role().unwrap(), UserRole::HeadOf);
    }

    #[test]
    fn test_invalid_token() {
        let verifier = TokenVerifier::new("test-secret-key".to_string());
        assert!(verifier.verify("invalid.token.here").is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let token = issue_token(Uuid::new_v4(), UserRole::Admin, "secret1", 900).unwrap();
        assert!(verify_token(&token, "secret2").is_err());
    }

    #[test]
    fn test_expired_token() {
        // Past the default 60s leeway
        let token = issue_token(Uuid::new_v4(), UserRole::Sales, "secret", -3600).unwrap();
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(JwtError::TokenExpired)
        ));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            role: "accountant".to_string(),
            iat: 0,
            exp: 0,
        };
        assert!(claims.role().is_err());
    }
}
