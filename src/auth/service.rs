//! Session lifecycle: login, refresh, and logout.
//!
//! Each identity has exactly one session slot holding its current refresh
//! token. Login overwrites the slot, so the previous refresh token stops
//! working the moment a new login succeeds. Refresh mints a new access token
//! and leaves the refresh token untouched. Logout empties the slot and
//! revokes the access token it was called with.

use crate::auth::errors::AuthError;
use crate::auth::jwt::{IssuedToken, JwtHandler, TokenError};
use crate::auth::models::{AuthenticatedUser, PresentedToken};
use crate::auth::password::CredentialVerifier;
use crate::auth::revocation::RevocationStore;
use crate::auth::user_store::{IdentityStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::BadSignature => AuthError::TokenBadSignature,
            TokenError::Expired => AuthError::TokenExpired,
        }
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: AuthenticatedUser,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

pub struct SessionService {
    verifier: CredentialVerifier,
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    revocations: Arc<dyn RevocationStore>,
    jwt: Arc<JwtHandler>,
}

impl SessionService {
    pub fn new(
        verifier: CredentialVerifier,
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        revocations: Arc<dyn RevocationStore>,
        jwt: Arc<JwtHandler>,
    ) -> Self {
        Self {
            verifier,
            identities,
            sessions,
            revocations,
            jwt,
        }
    }

    pub fn jwt(&self) -> &Arc<JwtHandler> {
        &self.jwt
    }

    /// Verify credentials and open a new session, replacing any existing one.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let user = match self.verifier.verify(username, password) {
            Ok(user) => user,
            Err(AuthError::InvalidCredentials) => {
                warn!("Failed login attempt: {}", username);
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let access = self
            .jwt
            .issue_access(&user.id, &user.username, user.role)
            .map_err(AuthError::Internal)?;
        let refresh = self.jwt.issue_refresh(&user.id).map_err(AuthError::Internal)?;

        self.sessions
            .persist_session(&user.id, &refresh.token)
            .map_err(AuthError::StorageFailure)?;

        info!("Login successful: {} ({})", user.username, user.role);

        Ok(LoginOutcome {
            user,
            access,
            refresh,
        })
    }

    /// Mint a new access token from the identity's current refresh token.
    pub fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, AuthError> {
        let claims = self.jwt.verify_refresh(refresh_token)?;

        let stored = self
            .sessions
            .lookup_session(&claims.sub)
            .map_err(AuthError::StorageFailure)?;

        if stored.as_deref() != Some(refresh_token) {
            warn!("Refresh rejected for {}: session replaced or logged out", claims.sub);
            return Err(AuthError::SessionMismatch);
        }

        // Re-read the identity so a changed role lands in the new token.
        let identity = self
            .identities
            .find_by_id(&claims.sub)
            .map_err(AuthError::StorageFailure)?
            .ok_or(AuthError::IdentityNotFound)?;

        let access = self
            .jwt
            .issue_access(&identity.id, &identity.username, identity.role)
            .map_err(AuthError::Internal)?;

        info!("Access token refreshed for {}", identity.username);

        Ok(access)
    }

    /// End the caller's session. Best-effort: storage failures are logged, never returned.
    pub fn logout(&self, user: &AuthenticatedUser, presented: &PresentedToken) {
        if let Err(e) = self.sessions.clear_session(&user.id) {
            error!("Failed to clear session for {}: {:#}", user.username, e);
        }

        // Tokens still verify during their `exp` second, so cover it too.
        let remaining = presented.expires_at - self.jwt.clock().now_secs() + 1;
        if remaining > 0 {
            let ttl = Duration::from_secs(remaining as u64);
            if let Err(e) = self.revocations.add(&presented.token, ttl) {
                error!(
                    "Failed to revoke access token for {}: {:#}",
                    user.username, e
                );
            }
        }

        info!("Logout: {} ({})", user.username, user.role);
    }
}
