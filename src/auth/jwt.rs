//! JWT Token Handler
//! Issues and verifies the two token kinds (access, refresh), each with its own secret and lifetime.

use crate::auth::clock::Clock;
use crate::auth::models::{AccessClaims, RefreshClaims, Role};
use anyhow::{bail, Context, Result};
use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Why a token failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

/// Claim sets that carry an expiry
pub trait TokenClaims: Serialize + DeserializeOwned {
    fn expires_at(&self) -> i64;
}

impl TokenClaims for AccessClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

impl TokenClaims for RefreshClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl IssuedToken {
    pub fn lifetime_secs(&self) -> i64 {
        self.expires_at - self.issued_at
    }
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KindKeys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// JWT Handler for both token kinds
pub struct JwtHandler {
    access: KindKeys,
    refresh: KindKeys,
    clock: Arc<dyn Clock>,
}

impl JwtHandler {
    /// Create a handler from the two signing secrets.
    ///
    /// The secrets must be non-empty and distinct, otherwise a token of one
    /// kind would verify as the other.
    pub fn new(access_secret: &str, refresh_secret: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            bail!("JWT signing secrets must not be empty");
        }
        if access_secret == refresh_secret {
            bail!("access and refresh tokens must be signed with different secrets");
        }

        Ok(Self {
            access: KindKeys::new(access_secret, Duration::seconds(DEFAULT_ACCESS_TTL_SECS)),
            refresh: KindKeys::new(refresh_secret, Duration::seconds(DEFAULT_REFRESH_TTL_SECS)),
            clock,
        })
    }

    pub fn with_lifetimes(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access.ttl = access_ttl;
        self.refresh.ttl = refresh_ttl;
        self
    }

    pub fn access_ttl(&self) -> Duration {
        self.access.ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn keys(&self, kind: TokenKind) -> &KindKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign an access token for an identity
    pub fn issue_access(&self, id: &str, username: &str, role: Role) -> Result<IssuedToken> {
        let iat = self.clock.now_secs();
        let exp = iat + self.access.ttl.num_seconds();

        let claims = AccessClaims {
            sub: id.to_string(),
            username: username.to_string(),
            role,
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        debug!(
            "Issuing access token for {} ({}), expires in {}s",
            username,
            id,
            self.access.ttl.num_seconds()
        );

        let token = self.sign(TokenKind::Access, &claims)?;
        Ok(IssuedToken {
            token,
            issued_at: iat,
            expires_at: exp,
        })
    }

    /// Sign a refresh token for an identity
    pub fn issue_refresh(&self, id: &str) -> Result<IssuedToken> {
        let iat = self.clock.now_secs();
        let exp = iat + self.refresh.ttl.num_seconds();

        let claims = RefreshClaims {
            sub: id.to_string(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        debug!("Issuing refresh token for {}", id);

        let token = self.sign(TokenKind::Refresh, &claims)?;
        Ok(IssuedToken {
            token,
            issued_at: iat,
            expires_at: exp,
        })
    }

    fn sign<C: Serialize>(&self, kind: TokenKind, claims: &C) -> Result<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(kind).encoding,
        )
        .with_context(|| format!("Failed to sign {} token", kind.as_str()))
    }

    /// Decode a token of the given kind.
    ///
    /// Signature is checked before expiry. Expiry is checked against the
    /// injected clock with no leeway.
    pub fn parse_and_verify<C: TokenClaims>(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let decoded =
            decode::<C>(token, &self.keys(kind).decoding, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature => TokenError::BadSignature,
                    _ => TokenError::Malformed,
                }
            })?;

        if self.clock.now_secs() > decoded.claims.expires_at() {
            return Err(TokenError::Expired);
        }

        Ok(decoded.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.parse_and_verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.parse_and_verify(token, TokenKind::Refresh)
    }
}
