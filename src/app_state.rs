//! Application state shared across handlers

use std::sync::Arc;
use std::time::Duration;

use crate::auth::cleanup::TokenCleanupService;
use crate::auth::coordinator::AuthenticationCoordinator;
use crate::auth::provider::{Argon2CredentialVerifier, CredentialVerifier};
use crate::auth::token::TokenIssuer;
use crate::auth::verification::VerificationService;
use crate::config::ServerConfig;
use crate::constants::DEFAULT_EXPIRING_PURGE_INTERVAL_SECS;
use crate::guardian::evaluator::PermissionEvaluator;
use crate::guardian::registry::GuardianRegistry;
use crate::guardian::subject::CareSubjectService;
use crate::notification::{LogNotificationDispatcher, SharedNotifier};
use crate::security_logger::{SecurityLogger, SharedSecurityLogger};
use crate::storage::expiring::{MemoryExpiringStore, SharedExpiringStore};
use crate::storage::memory::MemoryStorageProvider;
use crate::storage::token_revocation::RevocationStore;
use crate::storage::traits::SharedStorage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: SharedStorage,
    pub expiring: SharedExpiringStore,
    pub tokens: Arc<TokenIssuer>,
    pub auth: Arc<AuthenticationCoordinator>,
    pub verification: Arc<VerificationService>,
    pub evaluator: Arc<PermissionEvaluator>,
    pub guardians: Arc<GuardianRegistry>,
    pub care_subjects: Arc<CareSubjectService>,
    pub cleanup: Arc<TokenCleanupService>,
    pub security: SharedSecurityLogger,
}

impl AppState {
    /// Wire every service over the given stores and collaborators
    pub fn new(
        config: &ServerConfig,
        storage: SharedStorage,
        expiring: SharedExpiringStore,
        verifier: Arc<dyn CredentialVerifier>,
        notifier: SharedNotifier,
    ) -> Self {
        let security: SharedSecurityLogger = Arc::new(SecurityLogger::new());
        let revocations = Arc::new(RevocationStore::new(expiring.clone()));
        let tokens = Arc::new(TokenIssuer::new(config, revocations, storage.clone()));

        let auth = Arc::new(AuthenticationCoordinator::new(
            tokens.clone(),
            storage.clone(),
            verifier,
            security.clone(),
            config.login_min_duration,
        ));
        let verification = Arc::new(VerificationService::new(
            expiring.clone(),
            storage.clone(),
            notifier.clone(),
            config.verification_ttl,
        ));
        let evaluator = Arc::new(PermissionEvaluator::new(storage.clone(), security.clone()));
        let guardians = Arc::new(GuardianRegistry::new(
            storage.clone(),
            evaluator.clone(),
            notifier,
            security.clone(),
        ));
        let care_subjects = Arc::new(CareSubjectService::new(storage.clone(), evaluator.clone()));
        let cleanup = Arc::new(TokenCleanupService::new(
            storage.clone(),
            expiring.clone(),
            config.session_sweep_interval,
        ));

        Self {
            storage,
            expiring,
            tokens,
            auth,
            verification,
            evaluator,
            guardians,
            care_subjects,
            cleanup,
            security,
        }
    }

    /// In-memory stores, argon2 password checks and log-only notifications
    pub fn in_memory(config: &ServerConfig) -> Self {
        let storage: SharedStorage = Arc::new(MemoryStorageProvider::new());
        let expiring: SharedExpiringStore = Arc::new(MemoryExpiringStore::new());
        let verifier = Arc::new(Argon2CredentialVerifier::new(storage.clone()));
        Self::new(
            config,
            storage,
            expiring,
            verifier,
            Arc::new(LogNotificationDispatcher),
        )
    }

    /// Start the session sweep, the TTL purge and the security log pruning
    pub fn start_background_tasks(&self) {
        self.cleanup.clone().start();
        self.security.clone().start_cleanup_task();

        let expiring = self.expiring.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(DEFAULT_EXPIRING_PURGE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match expiring.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => log::debug!("Purged {} expired entries", purged),
                    Err(e) => log::error!("Failed to purge expired entries: {}", e),
                }
            }
        });
    }
}
