use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parley_config::AuthConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// An authenticated user reference, as named by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid session token")]
    InvalidSession,
    #[error("token creation failed: {0}")]
    TokenCreation(String),
}

#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Resolves a presented credential to the identity it was issued for.
pub trait SessionVerifier: Send + Sync {
    fn verify_session(&self, token: &str) -> Result<Session, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
}

/// HS256 session tokens shared with the identity service.
#[derive(Clone)]
pub struct Authenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    token_ttl: Duration,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let ttl = i64::try_from(config.token_ttl_seconds).unwrap_or(i64::MAX);

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            token_ttl: Duration::seconds(ttl.clamp(0, i64::MAX / 1_000)),
        }
    }

    /// Mint a token for `identity` valid for the configured TTL.
    pub fn issue_token(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue_token_with_ttl(identity, self.token_ttl)
    }

    pub fn issue_token_with_ttl(
        &self,
        identity: &Identity,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        if identity.as_str().trim().is_empty() {
            return Err(AuthError::TokenCreation("identity must not be empty".into()));
        }

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::TokenCreation("token lifetime overflows".into()))?;

        let claims = Claims {
            sub: identity.as_str().to_owned(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|error| AuthError::TokenCreation(error.to_string()))
    }
}

impl SessionVerifier for Authenticator {
    fn verify_session(&self, token: &str) -> Result<Session, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|error| {
            debug!(?error, "session token rejected");
            match error.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::SessionExpired,
                _ => AuthError::InvalidSession,
            }
        })?;

        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidSession);
        }

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(AuthError::InvalidSession)?;

        Ok(Session {
            identity: Identity::new(claims.sub),
            expires_at,
        })
    }
}
