//! Access and permission checks on care subjects
//!
//! Creators hold every permission on their care subjects whether or not a
//! guardian record exists for them. Everyone else needs an ACCEPTED
//! guardian record.

use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{CareHubError, Result};
use crate::guardian::model::{CareSubject, GuardianStatus, Permission};
use crate::security_logger::{SecurityEvent, SharedSecurityLogger};
use crate::storage::traits::SharedStorage;

pub struct PermissionEvaluator {
    storage: SharedStorage,
    security: SharedSecurityLogger,
}

impl PermissionEvaluator {
    pub fn new(storage: SharedStorage, security: SharedSecurityLogger) -> Self {
        Self { storage, security }
    }

    /// Active care subjects the user created or guards
    pub async fn accessible_subjects(&self, user_id: Uuid) -> Result<Vec<CareSubject>> {
        let subjects = self.storage.care_subjects();
        let mut result = subjects.find_active_by_creator(user_id).await?;
        let mut seen: HashSet<Uuid> = result.iter().map(|s| s.id).collect();

        let guardianships = self
            .storage
            .guardians()
            .find_by_user(user_id, Some(GuardianStatus::Accepted))
            .await?;
        for guardian in guardianships {
            if !seen.insert(guardian.care_subject_id) {
                continue;
            }
            if let Some(subject) = subjects.find_by_id(guardian.care_subject_id).await? {
                if subject.active {
                    result.push(subject);
                }
            }
        }
        Ok(result)
    }

    pub async fn has_access(&self, care_subject_id: Uuid, user_id: Uuid) -> Result<bool> {
        if self.is_creator(care_subject_id, user_id).await? {
            return Ok(true);
        }
        Ok(self
            .storage
            .guardians()
            .find_by_user_and_subject(user_id, care_subject_id)
            .await?
            .map_or(false, |g| g.is_accepted()))
    }

    pub async fn has_permission(
        &self,
        care_subject_id: Uuid,
        user_id: Uuid,
        permission: Permission,
    ) -> Result<bool> {
        if self.is_creator(care_subject_id, user_id).await? {
            return Ok(true);
        }
        Ok(self
            .storage
            .guardians()
            .find_by_user_and_subject(user_id, care_subject_id)
            .await?
            .map_or(false, |g| g.is_accepted() && g.has_permission(permission)))
    }

    /// AccessDenied unless the user can see the care subject
    pub async fn require_access(&self, care_subject_id: Uuid, user_id: Uuid) -> Result<()> {
        if self.has_access(care_subject_id, user_id).await? {
            return Ok(());
        }
        self.deny(care_subject_id, user_id, "ACCESS".to_string()).await
    }

    /// AccessDenied unless the user holds `permission` on the care subject
    pub async fn require_permission(
        &self,
        care_subject_id: Uuid,
        user_id: Uuid,
        permission: Permission,
    ) -> Result<()> {
        if self.has_permission(care_subject_id, user_id, permission).await? {
            return Ok(());
        }
        self.deny(care_subject_id, user_id, permission.to_string()).await
    }

    async fn deny(&self, care_subject_id: Uuid, user_id: Uuid, action: String) -> Result<()> {
        let message = format!("{} is not allowed on care subject {}", action, care_subject_id);
        self.security
            .log_event(SecurityEvent::PermissionDenied {
                user_id,
                care_subject_id,
                action,
            })
            .await;
        Err(CareHubError::AccessDenied(message))
    }

    async fn is_creator(&self, care_subject_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .storage
            .care_subjects()
            .find_by_id(care_subject_id)
            .await?
            .map_or(false, |s| s.created_by == user_id))
    }
}
