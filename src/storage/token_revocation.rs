//! Token revocation storage and management
//!
//! Revoked access tokens are kept in an expiring store only for as long as
//! the token itself would have stayed valid, so the denylist stays bounded.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::expiring::SharedExpiringStore;
use crate::constants::REVOCATION_KEY_PREFIX;
use crate::error::{CareHubError, Result};

/// Reason for token revocation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// User initiated logout
    UserLogout,
    /// Explicit revocation by the service
    Explicit,
}

/// Marker stored for a revoked token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationRecord {
    /// Subject of the revoked token, when it could be read
    pub subject: Option<String>,
    pub reason: RevocationReason,
    pub revoked_at: DateTime<Utc>,
}

/// Statistics about token revocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationStats {
    /// Number of revocation entries that have not yet expired
    pub active_revocations: usize,
}

/// Denylist of revoked tokens on top of an expiring store
pub struct RevocationStore {
    store: SharedExpiringStore,
}

impl RevocationStore {
    pub fn new(store: SharedExpiringStore) -> Self {
        Self { store }
    }

    /// Fixed-size key for a token, independent of the token's length
    fn key_for(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        format!("{}{}", REVOCATION_KEY_PREFIX, URL_SAFE_NO_PAD.encode(digest))
    }

    /// Add a token to the denylist for `remaining`. A zero TTL stores nothing.
    pub async fn revoke(
        &self,
        token: &str,
        remaining: Duration,
        subject: Option<String>,
        reason: RevocationReason,
    ) -> Result<()> {
        if token.is_empty() || remaining.is_zero() {
            return Ok(());
        }

        let record = RevocationRecord {
            subject,
            reason,
            revoked_at: Utc::now(),
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| CareHubError::InternalError(format!("Failed to encode revocation: {}", e)))?;

        self.store
            .set_with_ttl(&Self::key_for(token), value, remaining)
            .await?;
        log::debug!("Token revoked for {:?}, entry expires in {}s", reason, remaining.as_secs());
        Ok(())
    }

    /// Existence check, no decoding of the token involved
    pub async fn is_revoked(&self, token: &str) -> Result<bool> {
        self.store.contains(&Self::key_for(token)).await
    }

    /// Get revocation information for a token
    pub async fn revocation_info(&self, token: &str) -> Result<Option<RevocationRecord>> {
        match self.store.get(&Self::key_for(token)).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                CareHubError::StorageError(format!("Corrupt revocation entry: {}", e))
            }),
            None => Ok(None),
        }
    }

    /// Remaining lifetime of a token's revocation entry
    pub async fn remaining_ttl(&self, token: &str) -> Result<Option<Duration>> {
        self.store.ttl(&Self::key_for(token)).await
    }

    /// Get revocation statistics
    pub async fn stats(&self) -> Result<RevocationStats> {
        Ok(RevocationStats {
            active_revocations: self.store.count_prefix(REVOCATION_KEY_PREFIX).await?,
        })
    }
}

/// Shared reference to the revocation store
pub type SharedRevocationStore = Arc<RevocationStore>;
