//! Email verification codes
//!
//! A short numeric code is mailed to the address; entering it correctly
//! yields an opaque verification token that registration can redeem. Both
//! live in the expiring store and vanish after the configured TTL.

use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::provider::hash_password;
use crate::auth::user::User;
use crate::constants::{
    MIN_PASSWORD_LENGTH, VERIFICATION_CODE_LENGTH, VERIFICATION_CODE_PREFIX,
    VERIFICATION_TOKEN_PREFIX,
};
use crate::error::{CareHubError, Result};
use crate::notification::{dispatch_detached, Notification, SharedNotifier};
use crate::security::timing::constant_time_eq;
use crate::storage::expiring::SharedExpiringStore;
use crate::storage::traits::SharedStorage;

pub struct VerificationService {
    store: SharedExpiringStore,
    storage: SharedStorage,
    notifier: SharedNotifier,
    ttl: Duration,
}

fn code_key(email: &str) -> String {
    format!("{}{}", VERIFICATION_CODE_PREFIX, email.to_lowercase())
}

fn token_key(token: &str) -> String {
    format!("{}{}", VERIFICATION_TOKEN_PREFIX, token)
}

fn random_numeric_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

impl VerificationService {
    pub fn new(
        store: SharedExpiringStore,
        storage: SharedStorage,
        notifier: SharedNotifier,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
            ttl,
        }
    }

    /// Whether no account uses this email yet
    pub async fn email_available(&self, email: &str) -> Result<bool> {
        Ok(self.storage.users().find_by_email(email).await?.is_none())
    }

    /// Generate a fresh code for the address and send it. A previous code is replaced.
    pub async fn issue_code(&self, email: &str) -> Result<String> {
        let code = random_numeric_code(VERIFICATION_CODE_LENGTH);
        self.store
            .set_with_ttl(&code_key(email), code.clone(), self.ttl)
            .await?;

        dispatch_detached(
            &self.notifier,
            Notification::VerificationCodeIssued {
                email: email.to_string(),
                code: code.clone(),
            },
        );
        log::debug!("Verification code issued for {}", email);
        Ok(code)
    }

    pub async fn verify_code(&self, email: &str, code: &str) -> Result<bool> {
        Ok(match self.store.get(&code_key(email)).await? {
            Some(stored) => constant_time_eq(&stored, code.trim()),
            None => false,
        })
    }

    /// Exchange a correct code for a verification token
    pub async fn verify_email_code(&self, email: &str, code: &str) -> Result<String> {
        if !self.verify_code(email, code).await? {
            return Err(CareHubError::AuthenticationFailure(
                "invalid or expired verification code".to_string(),
            ));
        }
        self.create_verification_token(email).await
    }

    pub async fn create_verification_token(&self, email: &str) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        self.store
            .set_with_ttl(&token_key(&token), email.to_string(), self.ttl)
            .await?;
        Ok(token)
    }

    /// Email the token was issued for, while it is live
    pub async fn verify_token(&self, token: &str) -> Result<Option<String>> {
        self.store.get(&token_key(token)).await
    }

    /// Drop the code and the token once verification has been used
    pub async fn complete_verification(&self, email: &str, token: Option<&str>) -> Result<()> {
        self.store.remove(&code_key(email)).await?;
        if let Some(token) = token {
            self.store.remove(&token_key(token)).await?;
        }
        Ok(())
    }

    /// Create a password account for an address proven by `verification_token`.
    ///
    /// The token is consumed on success, so it registers exactly one account.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        verification_token: &str,
    ) -> Result<User> {
        let email = email.trim();
        let display_name = display_name.trim();
        if email.is_empty() || display_name.is_empty() {
            return Err(CareHubError::InvalidInput(
                "email and name must not be blank".to_string(),
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CareHubError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        match self.verify_token(verification_token).await? {
            Some(verified) if verified.eq_ignore_ascii_case(email) => {}
            _ => {
                return Err(CareHubError::InvalidToken(
                    "invalid or expired verification token".to_string(),
                ))
            }
        }

        let password_hash = hash_password(password)?;
        let user = self
            .storage
            .users()
            .create_user(User::with_password_hash(
                email.to_string(),
                display_name.to_string(),
                password_hash,
            ))
            .await?;

        self.complete_verification(email, Some(verification_token))
            .await?;
        log::info!("Registered user {}", user.id);
        Ok(user)
    }
}
