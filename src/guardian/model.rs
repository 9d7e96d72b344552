//! Guardian relationship model
//!
//! A guardian links one user to one care subject with a role. The role fully
//! determines the permission set: every role assignment recomputes it from
//! the static table below, and there is no other way to change a permission.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CareHubError, Result};

/// Role of a guardian on a care subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardianRole {
    Primary,
    Secondary,
    Temporary,
}

impl GuardianRole {
    /// Returns the permissions associated with this role
    pub const fn permissions(self) -> PermissionSet {
        match self {
            GuardianRole::Primary => PRIMARY_PERMISSIONS,
            GuardianRole::Secondary => SECONDARY_PERMISSIONS,
            GuardianRole::Temporary => TEMPORARY_PERMISSIONS,
        }
    }

    /// Check if this role has a specific permission
    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().get(permission)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GuardianRole::Primary => "PRIMARY",
            GuardianRole::Secondary => "SECONDARY",
            GuardianRole::Temporary => "TEMPORARY",
        }
    }
}

impl fmt::Display for GuardianRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invitation lifecycle of a guardian record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardianStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Capabilities that can be granted through a guardian role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ManageGuardians,   // Invite, re-role and remove guardians
    DeleteCareSubject, // Deactivate the care subject
    UpdateCareSubject, // Edit care subject details
    RecordActivities,  // Create care records
    ViewAllActivities, // Read every care record of the subject
    ManageSchedule,    // Edit schedules
    ManageHealthData,  // Edit health data
    ManageDocuments,   // Upload and remove documents
}

impl Permission {
    pub const COUNT: usize = 8;

    pub const ALL: [Permission; Permission::COUNT] = [
        Permission::ManageGuardians,
        Permission::DeleteCareSubject,
        Permission::UpdateCareSubject,
        Permission::RecordActivities,
        Permission::ViewAllActivities,
        Permission::ManageSchedule,
        Permission::ManageHealthData,
        Permission::ManageDocuments,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    pub fn key(self) -> &'static str {
        match self {
            Permission::ManageGuardians => "MANAGE_GUARDIANS",
            Permission::DeleteCareSubject => "DELETE_CARE_SUBJECT",
            Permission::UpdateCareSubject => "UPDATE_CARE_SUBJECT",
            Permission::RecordActivities => "RECORD_ACTIVITIES",
            Permission::ViewAllActivities => "VIEW_ALL_ACTIVITIES",
            Permission::ManageSchedule => "MANAGE_SCHEDULE",
            Permission::ManageHealthData => "MANAGE_HEALTH_DATA",
            Permission::ManageDocuments => "MANAGE_DOCUMENTS",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl FromStr for Permission {
    type Err = CareHubError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key(&s.to_ascii_uppercase())
            .ok_or_else(|| CareHubError::ResourceNotFound(format!("unknown permission {}", s)))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fixed-size permission map indexed by [`Permission`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSet([bool; Permission::COUNT]);

const PRIMARY_PERMISSIONS: PermissionSet = PermissionSet([true; Permission::COUNT]);
const SECONDARY_PERMISSIONS: PermissionSet =
    PermissionSet([false, false, true, true, true, true, true, true]);
const TEMPORARY_PERMISSIONS: PermissionSet =
    PermissionSet([false, false, false, true, true, false, false, false]);

impl PermissionSet {
    pub const fn empty() -> Self {
        Self([false; Permission::COUNT])
    }

    pub const fn get(&self, permission: Permission) -> bool {
        self.0[permission.index()]
    }

    /// Lookup by permission name; unknown names are never granted
    pub fn get_by_key(&self, key: &str) -> bool {
        Permission::from_key(key).map_or(false, |p| self.get(p))
    }

    pub fn granted(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL.into_iter().filter(|p| self.get(*p))
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Permission::COUNT))?;
        for permission in Permission::ALL {
            map.serialize_entry(permission.key(), &self.get(permission))?;
        }
        map.end()
    }
}

/// Relationship between a user and a care subject
#[derive(Debug, Clone, Serialize)]
pub struct Guardian {
    pub id: Uuid,
    pub user_id: Uuid,
    pub care_subject_id: Uuid,
    role: GuardianRole,
    status: GuardianStatus,
    permissions: PermissionSet,
    pub invited_by: Uuid,
    pub invited_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub memo: Option<String>,
    /// Optimistic concurrency version, bumped by the store on every write
    pub version: u64,
}

impl Guardian {
    /// A fresh PENDING invitation
    pub fn invitation(
        user_id: Uuid,
        care_subject_id: Uuid,
        role: GuardianRole,
        invited_by: Uuid,
        memo: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            care_subject_id,
            role,
            status: GuardianStatus::Pending,
            permissions: role.permissions(),
            invited_by,
            invited_at: Utc::now(),
            accepted_at: None,
            rejected_at: None,
            memo,
            version: 0,
        }
    }

    /// The ACCEPTED PRIMARY record registered for a care subject's creator
    pub fn creator(user_id: Uuid, care_subject_id: Uuid, memo: Option<String>) -> Self {
        let mut guardian = Self::invitation(user_id, care_subject_id, GuardianRole::Primary, user_id, memo);
        guardian.status = GuardianStatus::Accepted;
        guardian.accepted_at = Some(guardian.invited_at);
        guardian
    }

    pub fn role(&self) -> GuardianRole {
        self.role
    }

    pub fn status(&self) -> GuardianStatus {
        self.status
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    /// Replace the role and recompute the whole permission set from it
    pub fn assign_role(&mut self, role: GuardianRole) {
        self.role = role;
        self.permissions = role.permissions();
    }

    pub fn accept(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = GuardianStatus::Accepted;
        self.accepted_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = GuardianStatus::Rejected;
        self.rejected_at = Some(at);
        Ok(())
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status != GuardianStatus::Pending {
            return Err(CareHubError::InvalidState(format!(
                "invitation {} has already been processed",
                self.id
            )));
        }
        Ok(())
    }

    pub fn is_accepted(&self) -> bool {
        self.status == GuardianStatus::Accepted
    }

    pub fn is_accepted_primary(&self) -> bool {
        self.is_accepted() && self.role == GuardianRole::Primary
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.get(permission)
    }
}

/// A person or dependant that guardians care for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CareSubject {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl CareSubject {
    pub fn new(name: String, created_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            created_by,
            active: true,
            created_at: Utc::now(),
        }
    }
}
