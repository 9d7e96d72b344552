use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{CareHubError, Result};
use crate::storage::token_revocation::{RevocationReason, SharedRevocationStore};
use crate::storage::traits::{RefreshTokenRecord, SharedStorage};

/// Purpose a token was minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email, carried by access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Token kind
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (as UTC timestamp)
    pub iat: u64,
    /// Expiration time (as UTC timestamp)
    pub exp: u64,
    /// Unique token id
    pub jti: String,
}

impl Claims {
    fn new(user_id: Uuid, email: Option<String>, kind: TokenKind, ttl: Duration) -> Result<Self> {
        let now = now_secs();
        // exp must stay representable as a signed timestamp
        let exp = now
            .checked_add(ttl.as_secs())
            .filter(|exp| *exp <= i64::MAX as u64)
            .ok_or_else(|| CareHubError::InternalError("token lifetime out of range".to_string()))?;
        Ok(Self {
            sub: user_id.to_string(),
            email,
            kind,
            iat: now,
            exp,
            jti: Uuid::new_v4().to_string(),
        })
    }

    /// The user this token was issued to
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| CareHubError::InvalidToken("subject is not a user id".to_string()))
    }
}

/// Only what `revoke` needs, read without verifying the signature
#[derive(Debug, Deserialize)]
struct UntrustedClaims {
    exp: u64,
    #[serde(default)]
    sub: Option<String>,
}

fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Issues, validates and revokes signed tokens
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    max_revocation_ttl: Duration,
    revocations: SharedRevocationStore,
    storage: SharedStorage,
}

impl TokenIssuer {
    /// Creates a token issuer with the configured signing key and TTLs
    pub fn new(
        config: &ServerConfig,
        revocations: SharedRevocationStore,
        storage: SharedStorage,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = false;
        validation.required_spec_claims = ["exp", "sub"].iter().map(|c| c.to_string()).collect();

        Self {
            encoding_key: EncodingKey::from_secret(&config.jwt_secret),
            decoding_key: DecodingKey::from_secret(&config.jwt_secret),
            validation,
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            max_revocation_ttl: config.max_token_ttl(),
            revocations,
            storage,
        }
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| CareHubError::InternalError(format!("Failed to sign token: {}", e)))
    }

    /// Stateless access token for a user
    pub fn issue_access_token(&self, user_id: Uuid, email: &str) -> Result<String> {
        let claims = Claims::new(
            user_id,
            Some(email.to_string()),
            TokenKind::Access,
            self.access_token_ttl,
        )?;
        self.sign(&claims)
    }

    /// Refresh token for a device. The stored session for (user, device) is
    /// replaced by the new one.
    pub async fn issue_refresh_token(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<RefreshTokenRecord> {
        let claims = Claims::new(user_id, None, TokenKind::Refresh, self.refresh_token_ttl)?;
        let token = self.sign(&claims)?;

        let expires_at = chrono::DateTime::from_timestamp(claims.exp as i64, 0)
            .ok_or_else(|| CareHubError::InternalError("token expiry out of range".to_string()))?;
        let record = RefreshTokenRecord::new(token, user_id, device_id.to_string(), expires_at);

        if let Some(previous) = self
            .storage
            .refresh_tokens()
            .replace_for_device(record.clone())
            .await?
        {
            log::debug!(
                "Replaced session {} for user {} on device {}",
                previous.id,
                user_id,
                device_id
            );
        }
        Ok(record)
    }

    /// Validates a token of the expected kind.
    ///
    /// The denylist is consulted before the signature, so a revoked token is
    /// rejected without decoding it.
    pub async fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        if token.trim().is_empty() {
            return Err(CareHubError::InvalidToken("empty token".to_string()));
        }

        if self.revocations.is_revoked(token).await? {
            return Err(CareHubError::RevokedToken);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;
        if claims.kind != expected {
            return Err(CareHubError::InvalidToken(format!(
                "expected {:?} token",
                expected
            )));
        }
        Ok(claims)
    }

    pub async fn validate_access(&self, token: &str) -> Result<Claims> {
        self.validate(token, TokenKind::Access).await
    }

    /// Adds a token to the denylist for the rest of its lifetime.
    ///
    /// Expired, malformed and empty tokens are ignored; revoking twice is harmless.
    pub async fn revoke(&self, token: &str, reason: RevocationReason) -> Result<()> {
        if token.trim().is_empty() {
            return Ok(());
        }

        let mut insecure = Validation::new(Algorithm::HS256);
        insecure.insecure_disable_signature_validation();
        insecure.validate_exp = false;
        insecure.validate_nbf = false;
        insecure.required_spec_claims = HashSet::from(["exp".to_string()]);

        let claims = match decode::<UntrustedClaims>(token, &DecodingKey::from_secret(&[]), &insecure) {
            Ok(data) => data.claims,
            Err(e) => {
                log::debug!("Ignoring revocation of unreadable token: {}", e);
                return Ok(());
            }
        };

        let remaining = claims.exp.saturating_sub(now_secs());
        if remaining == 0 {
            return Ok(());
        }

        let ttl = Duration::from_secs(remaining).min(self.max_revocation_ttl);
        self.revocations.revoke(token, ttl, claims.sub, reason).await
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let (scheme, token) = auth_header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
