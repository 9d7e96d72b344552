use std::sync::Arc;
use uuid::Uuid;

use crate::constants::CREATOR_GUARDIAN_MEMO;
use crate::error::{CareHubError, Result};
use crate::guardian::evaluator::PermissionEvaluator;
use crate::guardian::model::{CareSubject, Guardian, Permission};
use crate::storage::traits::SharedStorage;

/// Creation and deactivation of care subjects
pub struct CareSubjectService {
    storage: SharedStorage,
    evaluator: Arc<PermissionEvaluator>,
}

impl CareSubjectService {
    pub fn new(storage: SharedStorage, evaluator: Arc<PermissionEvaluator>) -> Self {
        Self { storage, evaluator }
    }

    /// Create a care subject; the creator becomes its ACCEPTED PRIMARY guardian
    pub async fn create(&self, creator_id: Uuid, name: &str) -> Result<(CareSubject, Guardian)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CareHubError::InvalidInput("care subject name must not be blank".to_string()));
        }
        if self.storage.users().find_by_id(creator_id).await?.is_none() {
            return Err(CareHubError::ResourceNotFound(format!("User {} not found", creator_id)));
        }

        let subject = self
            .storage
            .care_subjects()
            .create_subject(CareSubject::new(name.to_string(), creator_id))
            .await?;
        let guardian = self
            .storage
            .guardians()
            .insert(Guardian::creator(
                creator_id,
                subject.id,
                Some(CREATOR_GUARDIAN_MEMO.to_string()),
            ))
            .await?;

        log::info!("Care subject {} created by {}", subject.id, creator_id);
        Ok((subject, guardian))
    }

    /// Mark a care subject inactive. Requires DELETE_CARE_SUBJECT.
    pub async fn deactivate(&self, care_subject_id: Uuid, caller_id: Uuid) -> Result<CareSubject> {
        let subject = self.get_active(care_subject_id).await?;
        self.evaluator
            .require_permission(subject.id, caller_id, Permission::DeleteCareSubject)
            .await?;

        let subject = self
            .storage
            .care_subjects()
            .set_active(care_subject_id, false)
            .await?;
        log::info!("Care subject {} deactivated by {}", care_subject_id, caller_id);
        Ok(subject)
    }

    /// Read a care subject the caller has access to
    pub async fn get(&self, care_subject_id: Uuid, caller_id: Uuid) -> Result<CareSubject> {
        let subject = self.get_active(care_subject_id).await?;
        self.evaluator.require_access(subject.id, caller_id).await?;
        Ok(subject)
    }

    pub async fn list_accessible(&self, caller_id: Uuid) -> Result<Vec<CareSubject>> {
        self.evaluator.accessible_subjects(caller_id).await
    }

    async fn get_active(&self, care_subject_id: Uuid) -> Result<CareSubject> {
        self.storage
            .care_subjects()
            .find_by_id(care_subject_id)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| {
                CareHubError::ResourceNotFound(format!("Care subject {} not found", care_subject_id))
            })
    }
}
