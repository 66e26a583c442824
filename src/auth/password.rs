//! Credential verification against stored bcrypt hashes.

use crate::auth::errors::AuthError;
use crate::auth::models::AuthenticatedUser;
use crate::auth::user_store::IdentityStore;
use anyhow::{Context, Result};
use bcrypt::{hash, verify};
use std::sync::Arc;

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    hash(password, cost).context("Failed to hash password")
}

/// Checks a username/password pair against the identity store.
pub struct CredentialVerifier {
    identities: Arc<dyn IdentityStore>,
    // Compared against when the username is unknown, so both rejections cost one bcrypt run.
    dummy_hash: String,
}

impl CredentialVerifier {
    pub fn new(identities: Arc<dyn IdentityStore>, cost: u32) -> Result<Self> {
        let dummy_hash = hash_password("sis-auth-unknown-user", cost)?;
        Ok(Self {
            identities,
            dummy_hash,
        })
    }

    pub fn verify(&self, username: &str, secret: &str) -> Result<AuthenticatedUser, AuthError> {
        let identity = self
            .identities
            .find_by_username(username)
            .map_err(AuthError::StorageFailure)?;

        let Some(identity) = identity else {
            let _ = verify(secret, &self.dummy_hash);
            return Err(AuthError::InvalidCredentials);
        };

        let valid = verify(secret, &identity.password_hash)
            .context("Failed to verify password")
            .map_err(AuthError::Internal)?;

        if !valid {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(AuthenticatedUser::from_identity(&identity))
    }
}
