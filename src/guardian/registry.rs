//! Guardian invitation state machine
//!
//! PENDING moves to ACCEPTED or REJECTED exactly once. Every write goes
//! through `GuardianStore::apply`, which refuses it if the record changed
//! since it was read, so two racing transitions cannot both commit.
//!
//! Each active care subject keeps exactly one ACCEPTED PRIMARY: a second
//! one can never be accepted or promoted, the sole one cannot be demoted,
//! and when it leaves, the longest-standing remaining guardian takes over.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CareHubError, Result};
use crate::guardian::evaluator::PermissionEvaluator;
use crate::guardian::model::{CareSubject, Guardian, GuardianRole, GuardianStatus, Permission};
use crate::notification::{dispatch_detached, Notification, SharedNotifier};
use crate::security_logger::{SecurityEvent, SharedSecurityLogger};
use crate::storage::traits::{GuardianChange, SharedStorage};

pub struct GuardianRegistry {
    storage: SharedStorage,
    evaluator: Arc<PermissionEvaluator>,
    notifier: SharedNotifier,
    security: SharedSecurityLogger,
}

impl GuardianRegistry {
    pub fn new(
        storage: SharedStorage,
        evaluator: Arc<PermissionEvaluator>,
        notifier: SharedNotifier,
        security: SharedSecurityLogger,
    ) -> Self {
        Self {
            storage,
            evaluator,
            notifier,
            security,
        }
    }

    async fn active_subject(&self, care_subject_id: Uuid) -> Result<CareSubject> {
        self.storage
            .care_subjects()
            .find_by_id(care_subject_id)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| {
                CareHubError::ResourceNotFound(format!("Care subject {} not found", care_subject_id))
            })
    }

    async fn guardian(&self, guardian_id: Uuid) -> Result<Guardian> {
        self.storage
            .guardians()
            .find_by_id(guardian_id)
            .await?
            .ok_or_else(|| CareHubError::ResourceNotFound(format!("Guardian {} not found", guardian_id)))
    }

    async fn other_accepted_primary(&self, care_subject_id: Uuid, except: Uuid) -> Result<bool> {
        Ok(self
            .storage
            .guardians()
            .find_accepted_primary(care_subject_id)
            .await?
            .map_or(false, |g| g.id != except))
    }

    /// Records InvalidState outcomes as invitation conflicts
    async fn observe<T>(&self, caller: Uuid, guardian_id: Option<Uuid>, result: Result<T>) -> Result<T> {
        if let Err(CareHubError::InvalidState(detail)) = &result {
            self.security
                .log_event(SecurityEvent::InvitationConflict {
                    user_id: caller,
                    guardian_id,
                    detail: detail.clone(),
                })
                .await;
        }
        result
    }

    async fn commit_one(&self, guardian: Guardian) -> Result<Guardian> {
        self.storage
            .guardians()
            .apply(vec![GuardianChange::Update(guardian)])
            .await?
            .pop()
            .ok_or_else(|| CareHubError::InternalError("guardian update returned nothing".to_string()))
    }

    /// Invite a registered user to guard a care subject
    pub async fn invite(
        &self,
        care_subject_id: Uuid,
        inviter_id: Uuid,
        invitee_email: &str,
        role: GuardianRole,
        memo: Option<String>,
    ) -> Result<Guardian> {
        let result = self
            .create_invitation(care_subject_id, inviter_id, invitee_email, role, memo)
            .await;
        self.observe(inviter_id, None, result).await
    }

    async fn create_invitation(
        &self,
        care_subject_id: Uuid,
        inviter_id: Uuid,
        invitee_email: &str,
        role: GuardianRole,
        memo: Option<String>,
    ) -> Result<Guardian> {
        self.active_subject(care_subject_id).await?;
        self.evaluator
            .require_permission(care_subject_id, inviter_id, Permission::ManageGuardians)
            .await?;

        let invitee = self
            .storage
            .users()
            .find_by_email(invitee_email)
            .await?
            .ok_or_else(|| CareHubError::ResourceNotFound(format!("No user registered as {}", invitee_email)))?;

        let guardians = self.storage.guardians();
        if guardians
            .find_by_user_and_subject(invitee.id, care_subject_id)
            .await?
            .is_some()
        {
            return Err(CareHubError::InvalidState(
                "user is already a guardian or has a pending invitation".to_string(),
            ));
        }
        if role == GuardianRole::Primary
            && guardians.find_accepted_primary(care_subject_id).await?.is_some()
        {
            return Err(CareHubError::InvalidState(
                "care subject already has a primary guardian".to_string(),
            ));
        }

        let guardian = guardians
            .insert(Guardian::invitation(
                invitee.id,
                care_subject_id,
                role,
                inviter_id,
                memo,
            ))
            .await?;

        log::info!(
            "User {} invited {} as {} guardian of {}",
            inviter_id,
            invitee.id,
            role,
            care_subject_id
        );
        dispatch_detached(
            &self.notifier,
            Notification::GuardianInvited {
                guardian_id: guardian.id,
                care_subject_id,
                invitee_id: invitee.id,
                invitee_email: invitee.email,
                inviter_id,
                role,
            },
        );
        Ok(guardian)
    }

    /// The invited user takes up the invitation
    pub async fn accept(&self, guardian_id: Uuid, caller_id: Uuid) -> Result<Guardian> {
        let result = self.resolve(guardian_id, caller_id, true).await;
        self.observe(caller_id, Some(guardian_id), result).await
    }

    /// The invited user declines the invitation
    pub async fn reject(&self, guardian_id: Uuid, caller_id: Uuid) -> Result<Guardian> {
        let result = self.resolve(guardian_id, caller_id, false).await;
        self.observe(caller_id, Some(guardian_id), result).await
    }

    async fn resolve(&self, guardian_id: Uuid, caller_id: Uuid, accept: bool) -> Result<Guardian> {
        let mut guardian = self.guardian(guardian_id).await?;
        if guardian.user_id != caller_id {
            return Err(CareHubError::AccessDenied(
                "only the invited user can answer an invitation".to_string(),
            ));
        }
        self.active_subject(guardian.care_subject_id).await?;

        let now = Utc::now();
        if accept {
            guardian.accept(now)?;
            if guardian.role() == GuardianRole::Primary
                && self
                    .other_accepted_primary(guardian.care_subject_id, guardian.id)
                    .await?
            {
                return Err(CareHubError::InvalidState(
                    "care subject already has a primary guardian".to_string(),
                ));
            }
        } else {
            guardian.reject(now)?;
        }

        let guardian = self.commit_one(guardian).await?;
        log::info!(
            "Guardian {} {} by user {}",
            guardian.id,
            if accept { "accepted" } else { "rejected" },
            caller_id
        );
        Ok(guardian)
    }

    /// Change a guardian's role; the permission set follows the role
    pub async fn update_role(
        &self,
        guardian_id: Uuid,
        new_role: GuardianRole,
        caller_id: Uuid,
    ) -> Result<Guardian> {
        let result = self.change_role(guardian_id, new_role, caller_id).await;
        self.observe(caller_id, Some(guardian_id), result).await
    }

    async fn change_role(
        &self,
        guardian_id: Uuid,
        new_role: GuardianRole,
        caller_id: Uuid,
    ) -> Result<Guardian> {
        let mut guardian = self.guardian(guardian_id).await?;
        let care_subject_id = guardian.care_subject_id;
        self.active_subject(care_subject_id).await?;
        self.require_primary(care_subject_id, caller_id).await?;

        if !guardian.is_accepted() {
            return Err(CareHubError::InvalidState(
                "only an accepted guardian can change role".to_string(),
            ));
        }
        if guardian.role() == new_role {
            return Ok(guardian);
        }
        if new_role == GuardianRole::Primary
            && self.other_accepted_primary(care_subject_id, guardian.id).await?
        {
            return Err(CareHubError::InvalidState(
                "care subject already has a primary guardian".to_string(),
            ));
        }
        if guardian.is_accepted_primary() {
            return Err(CareHubError::InvalidState(
                "the primary guardian cannot be demoted".to_string(),
            ));
        }

        guardian.assign_role(new_role);
        let guardian = self.commit_one(guardian).await?;
        log::info!("Guardian {} is now {}", guardian.id, new_role);
        Ok(guardian)
    }

    /// Delete a guardian record. Allowed for the subject's primary guardian
    /// and for the guardian's own user.
    pub async fn remove(&self, guardian_id: Uuid, caller_id: Uuid) -> Result<()> {
        let result = self.delete_guardian(guardian_id, caller_id).await;
        self.observe(caller_id, Some(guardian_id), result).await
    }

    async fn delete_guardian(&self, guardian_id: Uuid, caller_id: Uuid) -> Result<()> {
        let guardian = self.guardian(guardian_id).await?;
        let care_subject_id = guardian.care_subject_id;
        self.active_subject(care_subject_id).await?;

        let is_self = guardian.user_id == caller_id;
        if !is_self {
            self.require_primary(care_subject_id, caller_id).await?;
        }

        let mut changes = vec![GuardianChange::Delete {
            id: guardian.id,
            version: guardian.version,
        }];

        if guardian.is_accepted_primary() {
            let successor = self
                .storage
                .guardians()
                .find_by_subject(care_subject_id, Some(GuardianStatus::Accepted))
                .await?
                .into_iter()
                .filter(|g| g.id != guardian.id)
                .min_by_key(|g| (g.accepted_at, g.invited_at));

            let mut successor = successor.ok_or_else(|| {
                CareHubError::InvalidState(
                    "the sole primary guardian cannot leave the care subject".to_string(),
                )
            })?;
            successor.assign_role(GuardianRole::Primary);
            log::info!(
                "Guardian {} takes over as primary of {}",
                successor.id,
                care_subject_id
            );
            changes.push(GuardianChange::Update(successor));
        }

        self.storage.guardians().apply(changes).await?;
        log::info!("Guardian {} removed by user {}", guardian_id, caller_id);
        Ok(())
    }

    async fn require_primary(&self, care_subject_id: Uuid, caller_id: Uuid) -> Result<()> {
        let is_primary = self
            .storage
            .guardians()
            .find_by_user_and_subject(caller_id, care_subject_id)
            .await?
            .map_or(false, |g| g.is_accepted_primary());
        if is_primary {
            Ok(())
        } else {
            Err(CareHubError::AccessDenied(
                "only the primary guardian can manage this guardian".to_string(),
            ))
        }
    }

    /// ACCEPTED guardians of a care subject
    pub async fn guardians_of_subject(&self, care_subject_id: Uuid, caller_id: Uuid) -> Result<Vec<Guardian>> {
        self.evaluator.require_access(care_subject_id, caller_id).await?;
        self.storage
            .guardians()
            .find_by_subject(care_subject_id, Some(GuardianStatus::Accepted))
            .await
    }

    /// ACCEPTED guardianships held by a user
    pub async fn guardianships_of(&self, user_id: Uuid) -> Result<Vec<Guardian>> {
        self.storage
            .guardians()
            .find_by_user(user_id, Some(GuardianStatus::Accepted))
            .await
    }

    /// Invitations still waiting for the user's answer
    pub async fn pending_invitations(&self, user_id: Uuid) -> Result<Vec<Guardian>> {
        self.storage
            .guardians()
            .find_by_user(user_id, Some(GuardianStatus::Pending))
            .await
    }
}
