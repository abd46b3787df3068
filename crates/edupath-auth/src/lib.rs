//! Bearer-token issuing and verification.
//!
//! Tokens are signed JWTs (HS256) carrying the caller's identity. The shared
//! secret is configured at startup; verification is stateless and happens on
//! every request, with no server-side session or revocation list.

use chrono::{Duration, Utc};
use edupath_core::UserProfile;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims embedded in every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier.
    pub sub: String,
    /// Display name.
    pub name: String,
    /// Caller role, e.g. `"teacher"`.
    pub role: String,
    /// Expiration time (seconds since epoch).
    pub exp: i64,
    /// Issued-at time (seconds since epoch).
    pub iat: i64,
}

/// Why a presented token was rejected.
///
/// The middleware maps these to distinct HTTP responses so callers can tell
/// an expired credential from a forged one.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token's `exp` claim is in the past.
    #[error("token expired")]
    Expired,
    /// The signature did not verify or the token is malformed.
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Issues and verifies bearer tokens with a shared symmetric secret.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    /// Creates a token service from the shared secret and token lifetime.
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Signs a new token for the given identity.
    pub fn issue(&self, user: &UserProfile) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }

    /// Verifies signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}
