//! JWT session tokens
//!
//! HS256 tokens carrying the user id and role. The server turns a validated
//! token into an [`Actor`] that handlers pass into the core.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::permissions::{Actor, Role};
use crate::types::{Result, SurveyError};

/// Claims carried in a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

/// Issues and validates session tokens
#[derive(Clone)]
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_seconds: u64,
}

impl JwtValidator {
    pub fn new(secret: &str, expiry_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        }
    }

    pub fn issue(&self, user_id: &str, role: Role) -> Result<IssuedToken> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + self.expiry_seconds as i64,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| SurveyError::Auth(format!("Failed to sign token: {e}")))?;
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    /// Validate a token and return the caller it identifies
    pub fn validate(&self, token: &str) -> Result<Actor> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| SurveyError::Unauthorized(format!("invalid token: {e}")))?;
        Ok(Actor::new(data.claims.sub, data.claims.role))
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn extract_token_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
