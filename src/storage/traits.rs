//! Abstract storage interfaces for pluggable backends
//!
//! This module defines traits for the durable record stores: users,
//! device-scoped refresh-token sessions, guardian relationships and care
//! subjects. Backends must honour the uniqueness rules documented on each
//! trait; the services rely on them instead of re-checking under a lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::user::User;
use crate::error::Result;
use crate::guardian::model::{CareSubject, Guardian, GuardianStatus};

/// Persisted refresh-token session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    /// Opaque token value, unique across records
    pub token: String,
    pub user_id: Uuid,
    pub device_id: String,
    pub push_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(token: String, user_id: Uuid, device_id: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            user_id,
            device_id,
            push_token: None,
            expires_at,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// One step of a guardian unit of work
#[derive(Debug, Clone)]
pub enum GuardianChange {
    /// Overwrite a record. Its `version` must equal the stored version.
    Update(Guardian),
    /// Delete a record still at `version`
    Delete { id: Uuid, version: u64 },
}

/// User data storage interface
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a new user. Emails are unique.
    async fn create_user(&self, user: User) -> Result<User>;

    /// Get user by ID
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Get user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update user's last login timestamp
    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// Refresh-token session storage interface
///
/// Unique on `token`; at most one record per (user, device).
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Store a new session
    async fn save(&self, record: RefreshTokenRecord) -> Result<()>;

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    async fn find_by_user_and_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<RefreshTokenRecord>>;

    /// Returns whether a record was deleted
    async fn delete_by_token(&self, token: &str) -> Result<bool>;

    /// Returns whether a record was deleted
    async fn delete_by_user_and_device(&self, user_id: Uuid, device_id: &str) -> Result<bool>;

    /// Delete every session of a user, returning the number deleted
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<usize>;

    /// Batch delete of sessions with `expires_at < now`
    async fn delete_expired_before(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Delete the (user, device) session and insert `record` as one atomic step.
    /// Returns the replaced record, if any.
    async fn replace_for_device(
        &self,
        record: RefreshTokenRecord,
    ) -> Result<Option<RefreshTokenRecord>>;

    /// Attach a push-notification token to the session holding `token`
    async fn attach_push_token(&self, token: &str, push_token: String) -> Result<()>;

    /// Total stored sessions, expired ones included
    async fn count(&self) -> Result<usize>;
}

/// Guardian relationship storage interface
///
/// Unique on (user, care subject); at most one ACCEPTED PRIMARY per care subject.
#[async_trait]
pub trait GuardianStore: Send + Sync {
    /// Insert a new record at version 0
    async fn insert(&self, guardian: Guardian) -> Result<Guardian>;

    async fn find_by_id(&self, guardian_id: Uuid) -> Result<Option<Guardian>>;

    async fn find_by_user_and_subject(
        &self,
        user_id: Uuid,
        care_subject_id: Uuid,
    ) -> Result<Option<Guardian>>;

    /// Records of a care subject, optionally filtered by status, oldest invite first
    async fn find_by_subject(
        &self,
        care_subject_id: Uuid,
        status: Option<GuardianStatus>,
    ) -> Result<Vec<Guardian>>;

    /// Records of a user, optionally filtered by status, oldest invite first
    async fn find_by_user(&self, user_id: Uuid, status: Option<GuardianStatus>) -> Result<Vec<Guardian>>;

    async fn find_accepted_primary(&self, care_subject_id: Uuid) -> Result<Option<Guardian>>;

    /// Apply every change or none of them.
    ///
    /// Fails with InvalidState when a record's version moved since it was
    /// read, or when the result would break a uniqueness rule. Updated
    /// records are returned with their new version, in change order.
    async fn apply(&self, changes: Vec<GuardianChange>) -> Result<Vec<Guardian>>;
}

/// Care subject storage interface
#[async_trait]
pub trait CareSubjectStore: Send + Sync {
    async fn create_subject(&self, subject: CareSubject) -> Result<CareSubject>;

    async fn find_by_id(&self, care_subject_id: Uuid) -> Result<Option<CareSubject>>;

    /// Active subjects created by a user
    async fn find_active_by_creator(&self, user_id: Uuid) -> Result<Vec<CareSubject>>;

    async fn set_active(&self, care_subject_id: Uuid, active: bool) -> Result<CareSubject>;
}

/// Combined storage provider interface
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get user storage backend
    fn users(&self) -> &dyn UserStore;

    /// Get refresh-token storage backend
    fn refresh_tokens(&self) -> &dyn RefreshTokenStore;

    /// Get guardian storage backend
    fn guardians(&self) -> &dyn GuardianStore;

    /// Get care subject storage backend
    fn care_subjects(&self) -> &dyn CareSubjectStore;

    /// Health check for the storage backend
    async fn health_check(&self) -> Result<bool>;
}

/// Shared reference to a storage provider
pub type SharedStorage = Arc<dyn StorageProvider>;
