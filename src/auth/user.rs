use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity record of a registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,
    /// Login email, unique across users
    pub email: String,
    /// Argon2 PHC string; absent for social-login accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Name shown to other guardians
    pub display_name: String,
    pub profile_image_url: Option<String>,
    /// Inactive accounts cannot log in
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Creates a new active user
    pub fn new(email: String, display_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash: None,
            display_name,
            profile_image_url: None,
            active: true,
            created_at: Utc::now(),
            last_login_at: None,
        }
    }

    /// Creates a new user with a password hash
    pub fn with_password_hash(email: String, display_name: String, password_hash: String) -> Self {
        let mut user = Self::new(email, display_name);
        user.password_hash = Some(password_hash);
        user
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            display_name: self.display_name.clone(),
            profile_image_url: self.profile_image_url.clone(),
        }
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            active: self.active,
        }
    }
}

/// Minimal user info handed back with a token bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub display_name: String,
    pub profile_image_url: Option<String>,
}

/// Result of a successful credential check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub active: bool,
}
