//! Login, refresh and logout orchestration
//!
//! Stateless over its collaborators: every piece of session state lives in
//! the refresh-token store or the revocation store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::provider::CredentialVerifier;
use crate::auth::token::{TokenIssuer, TokenKind};
use crate::auth::user::UserSummary;
use crate::constants::TOKEN_TYPE_BEARER;
use crate::error::{CareHubError, Result};
use crate::security::timing::AuthTimer;
use crate::security_logger::{SecurityEvent, SharedSecurityLogger};
use crate::storage::token_revocation::RevocationReason;
use crate::storage::traits::SharedStorage;

/// Credentials presented at login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub push_token: Option<String>,
}

/// Whatever the client still holds when logging out
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub caller_id: Option<Uuid>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Tokens handed to a client after login or refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub device_id: String,
    pub user: UserSummary,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Orchestrates the session lifecycle
pub struct AuthenticationCoordinator {
    tokens: Arc<TokenIssuer>,
    storage: SharedStorage,
    verifier: Arc<dyn CredentialVerifier>,
    security: SharedSecurityLogger,
    login_min_duration: Duration,
}

impl AuthenticationCoordinator {
    pub fn new(
        tokens: Arc<TokenIssuer>,
        storage: SharedStorage,
        verifier: Arc<dyn CredentialVerifier>,
        security: SharedSecurityLogger,
        login_min_duration: Duration,
    ) -> Self {
        Self {
            tokens,
            storage,
            verifier,
            security,
            login_min_duration,
        }
    }

    /// Check credentials and open a session for the device
    pub async fn login(&self, request: LoginRequest) -> Result<TokenBundle> {
        let timer = AuthTimer::start(self.login_min_duration);
        let result = self.open_session(&request).await;

        match &result {
            Ok(bundle) => {
                self.security
                    .log_event(SecurityEvent::AuthenticationSuccess {
                        user_id: bundle.user.id,
                        device_id: bundle.device_id.clone(),
                    })
                    .await
            }
            Err(e) => {
                self.security
                    .log_event(SecurityEvent::AuthenticationFailed {
                        email: request.email.clone(),
                        reason: e.to_string(),
                    })
                    .await
            }
        }

        timer.wait().await;
        result
    }

    async fn open_session(&self, request: &LoginRequest) -> Result<TokenBundle> {
        let identity = self
            .verifier
            .authenticate(&request.email, &request.password)
            .await?;
        if !identity.active {
            return Err(CareHubError::AuthenticationFailure(
                "account is deactivated".to_string(),
            ));
        }

        let user = self
            .storage
            .users()
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| CareHubError::ResourceNotFound(format!("User {} not found", identity.id)))?;

        let device_id = non_blank(request.device_id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let access_token = self.tokens.issue_access_token(user.id, &user.email)?;
        let session = self.tokens.issue_refresh_token(user.id, &device_id).await?;

        if let Some(push_token) = non_blank(request.push_token.as_deref()) {
            self.storage
                .refresh_tokens()
                .attach_push_token(&session.token, push_token.to_string())
                .await?;
        }

        self.storage
            .users()
            .update_last_login(user.id, Utc::now())
            .await?;

        log::info!("User {} logged in on device {}", user.id, device_id);
        Ok(TokenBundle {
            access_token,
            refresh_token: session.token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: self.tokens.access_token_ttl().as_secs(),
            device_id,
            user: user.summary(),
        })
    }

    /// New access token for a stored session. The refresh token is returned unchanged.
    pub async fn refresh(&self, refresh_token: &str, device_id: Option<&str>) -> Result<TokenBundle> {
        let result = self.reissue_access(refresh_token, device_id).await;
        if let Err(e) = &result {
            self.security
                .log_event(SecurityEvent::TokenRejected {
                    reason: format!("refresh: {}", e),
                })
                .await;
        }
        result
    }

    async fn reissue_access(&self, refresh_token: &str, device_id: Option<&str>) -> Result<TokenBundle> {
        self.tokens.validate(refresh_token, TokenKind::Refresh).await?;

        let session = self
            .storage
            .refresh_tokens()
            .find_by_token(refresh_token)
            .await?
            .ok_or_else(|| CareHubError::InvalidToken("session not found".to_string()))?;

        if let Some(device_id) = non_blank(device_id) {
            if device_id != session.device_id {
                return Err(CareHubError::InvalidToken("device mismatch".to_string()));
            }
        }

        let user = self
            .storage
            .users()
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| {
                CareHubError::ResourceNotFound(format!("User {} not found", session.user_id))
            })?;

        let access_token = self.tokens.issue_access_token(user.id, &user.email)?;
        log::debug!("Access token refreshed for user {} on device {}", user.id, session.device_id);

        Ok(TokenBundle {
            access_token,
            refresh_token: session.token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: self.tokens.access_token_ttl().as_secs(),
            device_id: session.device_id,
            user: user.summary(),
        })
    }

    /// Revoke the access token and drop the device session
    pub async fn logout(&self, request: LogoutRequest) -> Result<()> {
        if let Some(access_token) = non_blank(request.access_token.as_deref()) {
            self.tokens
                .revoke(access_token, RevocationReason::UserLogout)
                .await?;
            self.security
                .log_event(SecurityEvent::TokenRevoked {
                    user_id: request.caller_id,
                    reason: "logout".to_string(),
                })
                .await;
        }

        let sessions = self.storage.refresh_tokens();
        if let Some(refresh_token) = non_blank(request.refresh_token.as_deref()) {
            sessions.delete_by_token(refresh_token).await?;
        } else if let (Some(caller_id), Some(device_id)) =
            (request.caller_id, non_blank(request.device_id.as_deref()))
        {
            sessions.delete_by_user_and_device(caller_id, device_id).await?;
        }
        Ok(())
    }

    /// Delete every session of a user. Access tokens already issued stay
    /// valid until they expire.
    pub async fn logout_all(&self, caller_id: Uuid) -> Result<usize> {
        let count = self
            .storage
            .refresh_tokens()
            .delete_all_for_user(caller_id)
            .await?;
        self.security
            .log_event(SecurityEvent::SessionsCleared {
                user_id: caller_id,
                count,
            })
            .await;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::{hash_password, Argon2CredentialVerifier};
    use crate::auth::user::User;
    use crate::config::ServerConfig;
    use crate::security_logger::SecurityLogger;
    use crate::storage::{MemoryExpiringStore, MemoryStorageProvider, RevocationStore};

    struct Fixture {
        coordinator: AuthenticationCoordinator,
        storage: SharedStorage,
        tokens: Arc<TokenIssuer>,
        security: SharedSecurityLogger,
        user: User,
    }

    async fn fixture() -> Fixture {
        let config = ServerConfig::for_testing();
        let storage: SharedStorage = Arc::new(MemoryStorageProvider::new());
        let revocations = Arc::new(RevocationStore::new(Arc::new(MemoryExpiringStore::new())));
        let tokens = Arc::new(TokenIssuer::new(&config, revocations, storage.clone()));
        let security = Arc::new(SecurityLogger::new());

        let user = storage
            .users()
            .create_user(User::with_password_hash(
                "ana@example.com".to_string(),
                "Ana".to_string(),
                hash_password("s3cret-pass").unwrap(),
            ))
            .await
            .unwrap();

        let coordinator = AuthenticationCoordinator::new(
            tokens.clone(),
            storage.clone(),
            Arc::new(Argon2CredentialVerifier::new(storage.clone())),
            security.clone(),
            config.login_min_duration,
        );
        Fixture {
            coordinator,
            storage,
            tokens,
            security,
            user,
        }
    }

    fn login_request(device_id: Option<&str>) -> LoginRequest {
        LoginRequest {
            email: "ana@example.com".to_string(),
            password: "s3cret-pass".to_string(),
            device_id: device_id.map(str::to_string),
            push_token: None,
        }
    }

    #[tokio::test]
    async fn test_login_issues_bundle() {
        let fx = fixture().await;
        let mut request = login_request(None);
        request.push_token = Some("fcm-123".to_string());

        let bundle = fx.coordinator.login(request).await.unwrap();

        assert_eq!(bundle.token_type, "Bearer");
        assert_eq!(bundle.user.id, fx.user.id);
        assert!(Uuid::parse_str(&bundle.device_id).is_ok());
        assert!(fx.tokens.validate_access(&bundle.access_token).await.is_ok());

        let session = fx
            .storage
            .refresh_tokens()
            .find_by_token(&bundle.refresh_token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.push_token.as_deref(), Some("fcm-123"));
        assert!(fx
            .storage
            .users()
            .find_by_id(fx.user.id)
            .await
            .unwrap()
            .unwrap()
            .last_login_at
            .is_some());
        assert_eq!(fx.security.event_count("auth_success").await, 1);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password_and_inactive_user() {
        let fx = fixture().await;
        let mut request = login_request(Some("A"));
        request.password = "wrong".to_string();
        assert!(matches!(
            fx.coordinator.login(request).await,
            Err(CareHubError::AuthenticationFailure(_))
        ));

        let mut inactive = User::with_password_hash(
            "old@example.com".to_string(),
            "Old".to_string(),
            hash_password("s3cret-pass").unwrap(),
        );
        inactive.active = false;
        fx.storage.users().create_user(inactive).await.unwrap();
        let mut request = login_request(None);
        request.email = "old@example.com".to_string();
        assert!(matches!(
            fx.coordinator.login(request).await,
            Err(CareHubError::AuthenticationFailure(_))
        ));
        assert_eq!(fx.security.event_count("auth_failed").await, 2);
        assert_eq!(fx.storage.refresh_tokens().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_does_not_rotate() {
        let fx = fixture().await;
        let bundle = fx.coordinator.login(login_request(Some("A"))).await.unwrap();

        let refreshed = fx
            .coordinator
            .refresh(&bundle.refresh_token, Some("A"))
            .await
            .unwrap();
        assert_eq!(refreshed.refresh_token, bundle.refresh_token);
        assert_ne!(refreshed.access_token, bundle.access_token);

        // Still usable afterwards, without a device id
        assert!(fx.coordinator.refresh(&bundle.refresh_token, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let fx = fixture().await;
        let bundle = fx.coordinator.login(login_request(Some("A"))).await.unwrap();
        assert!(matches!(
            fx.coordinator.refresh(&bundle.access_token, None).await,
            Err(CareHubError::InvalidToken(_))
        ));
        assert_eq!(fx.security.event_count("token_rejected").await, 1);
    }

    #[tokio::test]
    async fn test_logout_revokes_and_drops_session() {
        let fx = fixture().await;
        let bundle = fx.coordinator.login(login_request(Some("A"))).await.unwrap();

        fx.coordinator
            .logout(LogoutRequest {
                access_token: Some(bundle.access_token.clone()),
                refresh_token: Some(bundle.refresh_token.clone()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            fx.tokens.validate_access(&bundle.access_token).await.unwrap_err(),
            CareHubError::RevokedToken
        );
        assert!(fx
            .coordinator
            .refresh(&bundle.refresh_token, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_logout_falls_back_to_caller_and_device() {
        let fx = fixture().await;
        fx.coordinator.login(login_request(Some("A"))).await.unwrap();
        let kept = fx.coordinator.login(login_request(Some("B"))).await.unwrap();

        fx.coordinator
            .logout(LogoutRequest {
                caller_id: Some(fx.user.id),
                device_id: Some("A".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let sessions = fx.storage.refresh_tokens();
        assert!(sessions
            .find_by_user_and_device(fx.user.id, "A")
            .await
            .unwrap()
            .is_none());
        assert!(sessions.find_by_token(&kept.refresh_token).await.unwrap().is_some());

        // Nothing to go on: no-op
        fx.coordinator.logout(LogoutRequest::default()).await.unwrap();
        assert_eq!(sessions.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_logout_all_keeps_access_tokens_valid() {
        let fx = fixture().await;
        let a = fx.coordinator.login(login_request(Some("A"))).await.unwrap();
        fx.coordinator.login(login_request(Some("B"))).await.unwrap();

        assert_eq!(fx.coordinator.logout_all(fx.user.id).await.unwrap(), 2);
        assert!(fx.coordinator.refresh(&a.refresh_token, None).await.is_err());
        assert!(fx.tokens.validate_access(&a.access_token).await.is_ok());
    }
}
