//! Credential verification backends
//!
//! The coordinator only knows the [`CredentialVerifier`] trait, so social
//! login or an external identity service can replace the password check.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use rand::RngCore;

use crate::auth::user::UserIdentity;
use crate::error::{CareHubError, Result};
use crate::storage::traits::SharedStorage;

/// Checks an email/password pair
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns the matching identity or AuthenticationFailure
    async fn authenticate(&self, email: &str, password: &str) -> Result<UserIdentity>;

    /// Get the verifier name for logging/debugging
    fn provider_name(&self) -> &'static str;
}

/// Hash a password into an argon2 PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| CareHubError::InternalError(format!("Failed to encode salt: {}", e)))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CareHubError::InternalError(format!("Failed to hash password: {}", e)))
}

/// Verify a password against an argon2 PHC string
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// Password verifier over the user store
pub struct Argon2CredentialVerifier {
    storage: SharedStorage,
}

impl Argon2CredentialVerifier {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CredentialVerifier for Argon2CredentialVerifier {
    async fn authenticate(&self, email: &str, password: &str) -> Result<UserIdentity> {
        let failure = || CareHubError::AuthenticationFailure("Invalid email or password".to_string());

        let user = self
            .storage
            .users()
            .find_by_email(email)
            .await?
            .ok_or_else(failure)?;

        // Social-login accounts have no password to check against
        let hash = user.password_hash.as_deref().ok_or_else(failure)?;
        if !verify_password(password, hash) {
            return Err(failure());
        }

        Ok(user.identity())
    }

    fn provider_name(&self) -> &'static str {
        "ARGON2"
    }
}
