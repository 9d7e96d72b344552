//! Periodic sweep of expired sessions

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::storage::expiring::SharedExpiringStore;
use crate::storage::traits::SharedStorage;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_sessions: usize,
    pub expired_entries: usize,
}

/// Removes refresh tokens past their expiry and stale TTL entries
pub struct TokenCleanupService {
    storage: SharedStorage,
    expiring: SharedExpiringStore,
    interval: Duration,
}

impl TokenCleanupService {
    pub fn new(storage: SharedStorage, expiring: SharedExpiringStore, interval: Duration) -> Self {
        Self {
            storage,
            expiring,
            interval,
        }
    }

    /// Idempotent: a second sweep right after the first removes nothing
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let expired_sessions = self
            .storage
            .refresh_tokens()
            .delete_expired_before(Utc::now())
            .await?;
        let expired_entries = self.expiring.purge_expired().await?;

        Ok(SweepReport {
            expired_sessions,
            expired_entries,
        })
    }

    /// Start background sweep task
    pub fn start(self: Arc<Self>) {
        if self.interval.is_zero() {
            log::error!("Session sweep disabled: interval must be greater than zero");
            return;
        }
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                match self.sweep_once().await {
                    Ok(report) => log::info!(
                        "Session sweep removed {} expired sessions and {} expired entries",
                        report.expired_sessions,
                        report.expired_entries
                    ),
                    Err(e) => log::error!("Session sweep failed: {}", e),
                }
            }
        });
    }
}
