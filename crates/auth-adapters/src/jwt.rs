//! HS256 bearer tokens.
//!
//! Tokens carry the user id and the two staff capability bits. Expiry is
//! always validated.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use domains::ports::IdentityVerifier;
use domains::{Actor, Capabilities, DomainError, Result, UserId};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    exp: i64,
    iat: i64,
    #[serde(default)]
    moderator: bool,
    #[serde(default)]
    admin: bool,
}

pub struct JwtIdentity {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtIdentity {
    pub const MIN_SECRET_LENGTH: usize = 32;

    pub fn new(secret: &SecretString, ttl_secs: u64) -> Result<Self> {
        let raw = secret.expose_secret().as_bytes();
        if raw.len() < Self::MIN_SECRET_LENGTH {
            return Err(DomainError::InvalidInput(format!(
                "JWT secret must be at least {} bytes, got {}",
                Self::MIN_SECRET_LENGTH,
                raw.len()
            )));
        }
        let ttl_secs = i64::try_from(ttl_secs)
            .map_err(|_| DomainError::InvalidInput("token ttl is too large".into()))?;
        Ok(Self {
            encoding: EncodingKey::from_secret(raw),
            decoding: DecodingKey::from_secret(raw),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::seconds(ttl_secs),
        })
    }

    /// Signs a token for `actor`, valid for the configured ttl.
    pub fn issue(&self, actor: &Actor) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: actor.user_id.0,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            moderator: actor.capabilities.is_moderator,
            admin: actor.capabilities.is_admin,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| DomainError::InvalidInput(format!("cannot sign token: {e}")))
    }
}

impl IdentityVerifier for JwtIdentity {
    fn verify(&self, token: &str) -> Result<Actor> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            DomainError::Unauthorized("invalid or expired token".into())
        })?;
        let claims = data.claims;
        Ok(Actor {
            user_id: UserId(claims.sub),
            capabilities: Capabilities {
                is_moderator: claims.moderator,
                is_admin: claims.admin,
            },
        })
    }
}
