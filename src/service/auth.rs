//! JWT Authentication
//!
//! Validates JWTs issued by the hosted auth backend. The engine never issues
//! tokens. Validated claims map to a [`PlayerId`] and, for administrators,
//! to an [`AdminCapability`](crate::service::admin::AdminCapability).

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::game::state::PlayerId;

/// Role the hosted backend assigns to trusted server-side callers.
pub const SERVICE_ROLE: &str = "service_role";

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 secret (the hosted backend's JWT secret).
    pub secret: Option<String>,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Check if authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }

    /// Signature algorithm: RS256 when a public key is set, HS256 otherwise.
    pub fn algorithm(&self) -> Algorithm {
        if self.public_key_pem.is_some() {
            Algorithm::RS256
        } else {
            Algorithm::HS256
        }
    }

    /// Validation rules. No registered claim is mandatory; issuer and
    /// audience are only checked when configured.
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm());
        validation.required_spec_claims.clear();
        validation.validate_exp = !self.skip_expiry;
        validation.validate_aud = self.audience.is_some();

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        }
        validation
    }

    fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        match (&self.public_key_pem, &self.secret) {
            (Some(pem), _) => DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::DecodeError(format!("invalid public key: {e}"))),
            (None, Some(secret)) => Ok(DecodingKey::from_secret(secret.as_bytes())),
            (None, None) => Err(AuthError::NotConfigured),
        }
    }
}

/// Application metadata the backend attaches to a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Administrator flag.
    #[serde(default)]
    pub is_admin: bool,
}

/// JWT claims issued by the auth backend.
///
/// Player sessions carry a UUID `sub` and `role = "authenticated"`. The
/// backend's service key carries `role = "service_role"` and no subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the user id. Empty on service keys.
    #[serde(default)]
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Backend role (`authenticated`, `service_role`, ...).
    #[serde(default)]
    pub role: Option<String>,
    /// Application metadata.
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

impl TokenClaims {
    /// Whether this is the backend's service key.
    pub fn is_service_role(&self) -> bool {
        self.role.as_deref() == Some(SERVICE_ROLE)
    }

    /// Subject used for identity. Service keys without `sub` act as the
    /// role itself.
    fn subject(&self) -> &str {
        if self.sub.is_empty() && self.is_service_role() {
            SERVICE_ROLE
        } else {
            &self.sub
        }
    }

    /// Player the token speaks for.
    ///
    /// A UUID subject maps to itself so ids line up with the profile store.
    /// Anything else is hashed down to 16 bytes.
    pub fn player_id(&self) -> PlayerId {
        let subject = self.subject();
        if let Some(id) = PlayerId::from_uuid_str(subject) {
            return id;
        }

        let hash = Sha256::new()
            .chain_update(b"crash-engine-player:")
            .chain_update(subject.as_bytes())
            .finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        PlayerId::new(id)
    }

    /// Whether the claims grant administrator rights.
    pub fn is_admin(&self) -> bool {
        self.app_metadata.is_admin || self.is_service_role()
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authentication configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) => Self::InvalidFormat,
            _ => Self::DecodeError(err.to_string()),
        }
    }
}

/// Validate a session token or service key and return its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let key = config.decoding_key()?;
    let claims = decode::<TokenClaims>(token, &key, &config.validation())?.claims;

    if claims.sub.is_empty() && !claims.is_service_role() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // exp = 0 means the backend issued a non-expiring key
    if !config.skip_expiry && claims.exp > 0 && unix_now() > claims.exp {
        return Err(AuthError::Expired);
    }

    Ok(claims)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
