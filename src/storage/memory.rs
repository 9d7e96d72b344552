//! In-memory storage implementation for development and testing
//!
//! This provides a complete storage implementation that keeps all data
//! in memory. Each table sits behind its own lock, and every multi-step
//! write (session replacement, guardian units of work) happens while
//! holding that table's write lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::*;
use crate::auth::user::User;
use crate::error::{CareHubError, Result};
use crate::guardian::model::{CareSubject, Guardian, GuardianStatus};

/// Sessions indexed by token and by (user, device)
#[derive(Default)]
struct SessionTable {
    by_token: HashMap<String, RefreshTokenRecord>,
    by_device: HashMap<(Uuid, String), String>,
}

impl SessionTable {
    fn insert(&mut self, record: RefreshTokenRecord) {
        self.by_device
            .insert((record.user_id, record.device_id.clone()), record.token.clone());
        self.by_token.insert(record.token.clone(), record);
    }

    fn remove_token(&mut self, token: &str) -> Option<RefreshTokenRecord> {
        let record = self.by_token.remove(token)?;
        let key = (record.user_id, record.device_id.clone());
        if self.by_device.get(&key).map_or(false, |t| t == token) {
            self.by_device.remove(&key);
        }
        Some(record)
    }

    fn remove_device(&mut self, user_id: Uuid, device_id: &str) -> Option<RefreshTokenRecord> {
        let token = self.by_device.remove(&(user_id, device_id.to_string()))?;
        self.by_token.remove(&token)
    }
}

/// Complete in-memory storage provider
pub struct MemoryStorageProvider {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    user_emails: Arc<RwLock<HashMap<String, Uuid>>>, // lowercase email -> user_id
    sessions: Arc<RwLock<SessionTable>>,
    guardians: Arc<RwLock<HashMap<Uuid, Guardian>>>,
    care_subjects: Arc<RwLock<HashMap<Uuid, CareSubject>>>,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            user_emails: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(SessionTable::default())),
            guardians: Arc::new(RwLock::new(HashMap::new())),
            care_subjects: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryStorageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    fn users(&self) -> &dyn UserStore {
        self
    }

    fn refresh_tokens(&self) -> &dyn RefreshTokenStore {
        self
    }

    fn guardians(&self) -> &dyn GuardianStore {
        self
    }

    fn care_subjects(&self) -> &dyn CareSubjectStore {
        self
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl UserStore for MemoryStorageProvider {
    async fn create_user(&self, user: User) -> Result<User> {
        let mut emails = self.user_emails.write().await;
        let mut users = self.users.write().await;

        let email_key = user.email.to_lowercase();
        if emails.contains_key(&email_key) {
            return Err(CareHubError::InvalidState(format!(
                "email {} is already registered",
                user.email
            )));
        }

        emails.insert(email_key, user.id);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let emails = self.user_emails.read().await;
        let users = self.users.read().await;

        if let Some(user_id) = emails.get(&email.to_lowercase()) {
            Ok(users.get(user_id).cloned())
        } else {
            Ok(None)
        }
    }

    async fn update_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.last_login_at = Some(at);
            Ok(())
        } else {
            Err(CareHubError::ResourceNotFound(format!("User {} not found", user_id)))
        }
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStorageProvider {
    async fn save(&self, record: RefreshTokenRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if sessions.by_token.contains_key(&record.token) {
            return Err(CareHubError::StorageError("duplicate refresh token".to_string()));
        }
        if sessions
            .by_device
            .contains_key(&(record.user_id, record.device_id.clone()))
        {
            return Err(CareHubError::InvalidState(format!(
                "device {} already has a session",
                record.device_id
            )));
        }

        sessions.insert(record);
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.sessions.read().await.by_token.get(token).cloned())
    }

    async fn find_by_user_and_device(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .by_device
            .get(&(user_id, device_id.to_string()))
            .and_then(|token| sessions.by_token.get(token))
            .cloned())
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove_token(token).is_some())
    }

    async fn delete_by_user_and_device(&self, user_id: Uuid, device_id: &str) -> Result<bool> {
        Ok(self
            .sessions
            .write()
            .await
            .remove_device(user_id, device_id)
            .is_some())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let tokens: Vec<String> = sessions
            .by_token
            .values()
            .filter(|record| record.user_id == user_id)
            .map(|record| record.token.clone())
            .collect();

        for token in &tokens {
            sessions.remove_token(token);
        }
        Ok(tokens.len())
    }

    async fn delete_expired_before(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .by_token
            .values()
            .filter(|record| record.is_expired_at(now))
            .map(|record| record.token.clone())
            .collect();

        for token in &expired {
            sessions.remove_token(token);
        }
        Ok(expired.len())
    }

    async fn replace_for_device(
        &self,
        record: RefreshTokenRecord,
    ) -> Result<Option<RefreshTokenRecord>> {
        let mut sessions = self.sessions.write().await;

        if sessions.by_token.contains_key(&record.token) {
            return Err(CareHubError::StorageError("duplicate refresh token".to_string()));
        }

        let previous = sessions.remove_device(record.user_id, &record.device_id);
        sessions.insert(record);
        Ok(previous)
    }

    async fn attach_push_token(&self, token: &str, push_token: String) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.by_token.get_mut(token) {
            Some(record) => {
                record.push_token = Some(push_token);
                Ok(())
            }
            None => Err(CareHubError::ResourceNotFound("session not found".to_string())),
        }
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.sessions.read().await.by_token.len())
    }
}

/// Pending guardian writes; `None` marks a delete
type Staged = HashMap<Uuid, Option<Guardian>>;

/// (version, owner, care subject) of a guardian as the batch currently sees it
fn staged_view(
    committed: &HashMap<Uuid, Guardian>,
    staged: &Staged,
    id: Uuid,
) -> Result<(u64, Uuid, Uuid)> {
    let current = match staged.get(&id) {
        Some(entry) => entry.as_ref(),
        None => committed.get(&id),
    };
    current
        .map(|g| (g.version, g.user_id, g.care_subject_id))
        .ok_or_else(|| CareHubError::ResourceNotFound(format!("Guardian {} not found", id)))
}

/// First care subject in `subjects` left with more than one ACCEPTED PRIMARY
fn primary_conflict(
    committed: &HashMap<Uuid, Guardian>,
    staged: &Staged,
    subjects: &HashSet<Uuid>,
) -> Option<Uuid> {
    let mut seen = HashSet::new();
    committed
        .values()
        .filter(|g| !staged.contains_key(&g.id))
        .chain(staged.values().flatten())
        .filter(|g| g.is_accepted_primary() && subjects.contains(&g.care_subject_id))
        .map(|g| g.care_subject_id)
        .find(|subject| !seen.insert(*subject))
}

fn sorted_by_invite(mut guardians: Vec<Guardian>) -> Vec<Guardian> {
    guardians.sort_by(|a, b| a.invited_at.cmp(&b.invited_at).then(a.id.cmp(&b.id)));
    guardians
}

#[async_trait]
impl GuardianStore for MemoryStorageProvider {
    async fn insert(&self, mut guardian: Guardian) -> Result<Guardian> {
        let mut guardians = self.guardians.write().await;

        let duplicate = guardians.values().any(|g| {
            g.user_id == guardian.user_id && g.care_subject_id == guardian.care_subject_id
        });
        if duplicate {
            return Err(CareHubError::InvalidState(
                "user already has a guardian record for this care subject".to_string(),
            ));
        }

        if guardian.is_accepted_primary()
            && guardians
                .values()
                .any(|g| g.care_subject_id == guardian.care_subject_id && g.is_accepted_primary())
        {
            return Err(CareHubError::InvalidState(
                "care subject already has a primary guardian".to_string(),
            ));
        }

        guardian.version = 0;
        guardians.insert(guardian.id, guardian.clone());
        Ok(guardian)
    }

    async fn find_by_id(&self, guardian_id: Uuid) -> Result<Option<Guardian>> {
        Ok(self.guardians.read().await.get(&guardian_id).cloned())
    }

    async fn find_by_user_and_subject(
        &self,
        user_id: Uuid,
        care_subject_id: Uuid,
    ) -> Result<Option<Guardian>> {
        let guardians = self.guardians.read().await;
        Ok(guardians
            .values()
            .find(|g| g.user_id == user_id && g.care_subject_id == care_subject_id)
            .cloned())
    }

    async fn find_by_subject(
        &self,
        care_subject_id: Uuid,
        status: Option<GuardianStatus>,
    ) -> Result<Vec<Guardian>> {
        let guardians = self.guardians.read().await;
        let results = guardians
            .values()
            .filter(|g| g.care_subject_id == care_subject_id)
            .filter(|g| status.map_or(true, |s| g.status() == s))
            .cloned()
            .collect();
        Ok(sorted_by_invite(results))
    }

    async fn find_by_user(&self, user_id: Uuid, status: Option<GuardianStatus>) -> Result<Vec<Guardian>> {
        let guardians = self.guardians.read().await;
        let results = guardians
            .values()
            .filter(|g| g.user_id == user_id)
            .filter(|g| status.map_or(true, |s| g.status() == s))
            .cloned()
            .collect();
        Ok(sorted_by_invite(results))
    }

    async fn find_accepted_primary(&self, care_subject_id: Uuid) -> Result<Option<Guardian>> {
        let guardians = self.guardians.read().await;
        Ok(guardians
            .values()
            .find(|g| g.care_subject_id == care_subject_id && g.is_accepted_primary())
            .cloned())
    }

    async fn apply(&self, changes: Vec<GuardianChange>) -> Result<Vec<Guardian>> {
        let mut guardians = self.guardians.write().await;
        let mut staged = Staged::new();
        let mut touched_subjects = HashSet::new();
        let mut updated = Vec::new();

        for change in changes {
            match change {
                GuardianChange::Update(mut guardian) => {
                    let (version, user_id, care_subject_id) =
                        staged_view(&guardians, &staged, guardian.id)?;
                    if version != guardian.version {
                        return Err(stale(guardian.id));
                    }
                    if user_id != guardian.user_id || care_subject_id != guardian.care_subject_id {
                        return Err(CareHubError::InvalidState(
                            "guardian owner and care subject are immutable".to_string(),
                        ));
                    }

                    guardian.version += 1;
                    touched_subjects.insert(guardian.care_subject_id);
                    staged.insert(guardian.id, Some(guardian.clone()));
                    updated.push(guardian);
                }
                GuardianChange::Delete { id, version } => {
                    let (current, _, _) = staged_view(&guardians, &staged, id)?;
                    if current != version {
                        return Err(stale(id));
                    }
                    staged.insert(id, None);
                }
            }
        }

        if let Some(subject) = primary_conflict(&guardians, &staged, &touched_subjects) {
            return Err(CareHubError::InvalidState(format!(
                "care subject {} already has a primary guardian",
                subject
            )));
        }

        for (id, entry) in staged {
            match entry {
                Some(guardian) => {
                    guardians.insert(id, guardian);
                }
                None => {
                    guardians.remove(&id);
                }
            }
        }
        Ok(updated)
    }
}

fn stale(guardian_id: Uuid) -> CareHubError {
    CareHubError::InvalidState(format!(
        "guardian {} was modified concurrently",
        guardian_id
    ))
}

#[async_trait]
impl CareSubjectStore for MemoryStorageProvider {
    async fn create_subject(&self, subject: CareSubject) -> Result<CareSubject> {
        self.care_subjects
            .write()
            .await
            .insert(subject.id, subject.clone());
        Ok(subject)
    }

    async fn find_by_id(&self, care_subject_id: Uuid) -> Result<Option<CareSubject>> {
        Ok(self.care_subjects.read().await.get(&care_subject_id).cloned())
    }

    async fn find_active_by_creator(&self, user_id: Uuid) -> Result<Vec<CareSubject>> {
        let subjects = self.care_subjects.read().await;
        let mut results: Vec<CareSubject> = subjects
            .values()
            .filter(|s| s.active && s.created_by == user_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }

    async fn set_active(&self, care_subject_id: Uuid, active: bool) -> Result<CareSubject> {
        let mut subjects = self.care_subjects.write().await;
        match subjects.get_mut(&care_subject_id) {
            Some(subject) => {
                subject.active = active;
                Ok(subject.clone())
            }
            None => Err(CareHubError::ResourceNotFound(format!(
                "Care subject {} not found",
                care_subject_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardian::model::GuardianRole;
    use chrono::Duration;

    fn session(user_id: Uuid, device: &str, token: &str) -> RefreshTokenRecord {
        RefreshTokenRecord::new(
            token.to_string(),
            user_id,
            device.to_string(),
            Utc::now() + Duration::days(14),
        )
    }

    #[tokio::test]
    async fn test_replace_for_device_keeps_one_session() {
        let storage = MemoryStorageProvider::new();
        let sessions = storage.refresh_tokens();
        let user = Uuid::new_v4();

        assert!(sessions
            .replace_for_device(session(user, "A", "t1"))
            .await
            .unwrap()
            .is_none());
        let replaced = sessions
            .replace_for_device(session(user, "A", "t2"))
            .await
            .unwrap();

        assert_eq!(replaced.unwrap().token, "t1");
        assert!(sessions.find_by_token("t1").await.unwrap().is_none());
        assert_eq!(
            sessions.find_by_user_and_device(user, "A").await.unwrap().unwrap().token,
            "t2"
        );
        assert_eq!(sessions.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_expired_before() {
        let storage = MemoryStorageProvider::new();
        let sessions = storage.refresh_tokens();
        let user = Uuid::new_v4();

        let mut stale_session = session(user, "old", "t-old");
        stale_session.expires_at = Utc::now() - Duration::seconds(1);
        sessions.save(stale_session).await.unwrap();
        sessions.save(session(user, "new", "t-new")).await.unwrap();

        assert_eq!(sessions.delete_expired_before(Utc::now()).await.unwrap(), 1);
        assert_eq!(sessions.delete_expired_before(Utc::now()).await.unwrap(), 0);
        assert!(sessions.find_by_user_and_device(user, "old").await.unwrap().is_none());
        assert!(sessions.find_by_token("t-new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let storage = MemoryStorageProvider::new();
        let sessions = storage.refresh_tokens();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        sessions.save(session(user, "A", "a")).await.unwrap();
        sessions.save(session(user, "B", "b")).await.unwrap();
        sessions.save(session(other, "A", "c")).await.unwrap();

        assert_eq!(sessions.delete_all_for_user(user).await.unwrap(), 2);
        assert_eq!(sessions.count().await.unwrap(), 1);
        assert!(sessions.delete_by_user_and_device(other, "A").await.unwrap());
        assert!(!sessions.delete_by_token("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_guardian_uniqueness_rules() {
        let storage = MemoryStorageProvider::new();
        let guardians = storage.guardians();
        let subject = Uuid::new_v4();
        let creator = Uuid::new_v4();

        guardians
            .insert(Guardian::creator(creator, subject, None))
            .await
            .unwrap();

        let duplicate = Guardian::invitation(creator, subject, GuardianRole::Secondary, creator, None);
        assert!(matches!(
            guardians.insert(duplicate).await,
            Err(CareHubError::InvalidState(_))
        ));

        let second_primary = Guardian::creator(Uuid::new_v4(), subject, None);
        assert!(matches!(
            guardians.insert(second_primary).await,
            Err(CareHubError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_rejects_stale_versions_atomically() {
        let storage = MemoryStorageProvider::new();
        let guardians = storage.guardians();
        let subject = Uuid::new_v4();
        let creator = Uuid::new_v4();

        let primary = guardians
            .insert(Guardian::creator(creator, subject, None))
            .await
            .unwrap();
        let invited = guardians
            .insert(Guardian::invitation(
                Uuid::new_v4(),
                subject,
                GuardianRole::Secondary,
                creator,
                None,
            ))
            .await
            .unwrap();

        let mut accepted = invited.clone();
        accepted.accept(Utc::now()).unwrap();
        let updated = guardians
            .apply(vec![GuardianChange::Update(accepted)])
            .await
            .unwrap();
        assert_eq!(updated[0].version, 1);

        // Second writer still holds version 0
        let mut rejected = invited.clone();
        rejected.reject(Utc::now()).unwrap();
        let mut demoted = primary.clone();
        demoted.assign_role(GuardianRole::Secondary);
        let result = guardians
            .apply(vec![
                GuardianChange::Update(demoted),
                GuardianChange::Update(rejected),
            ])
            .await;
        assert!(matches!(result, Err(CareHubError::InvalidState(_))));

        let untouched = guardians.find_by_id(primary.id).await.unwrap().unwrap();
        assert_eq!(untouched.role(), GuardianRole::Primary);
        assert_eq!(untouched.version, 0);
    }

    #[tokio::test]
    async fn test_apply_enforces_single_accepted_primary() {
        let storage = MemoryStorageProvider::new();
        let guardians = storage.guardians();
        let subject = Uuid::new_v4();
        let creator = Uuid::new_v4();

        guardians
            .insert(Guardian::creator(creator, subject, None))
            .await
            .unwrap();
        let mut invited = guardians
            .insert(Guardian::invitation(
                Uuid::new_v4(),
                subject,
                GuardianRole::Primary,
                creator,
                None,
            ))
            .await
            .unwrap();
        invited.accept(Utc::now()).unwrap();

        assert!(matches!(
            guardians.apply(vec![GuardianChange::Update(invited)]).await,
            Err(CareHubError::InvalidState(_))
        ));
        assert_eq!(
            guardians
                .find_by_subject(subject, Some(GuardianStatus::Accepted))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_apply_swaps_primary_and_commits_nothing_on_failure() {
        let storage = MemoryStorageProvider::new();
        let guardians = storage.guardians();
        let subject = Uuid::new_v4();
        let other_subject = Uuid::new_v4();
        let creator = Uuid::new_v4();

        let primary = guardians
            .insert(Guardian::creator(creator, subject, None))
            .await
            .unwrap();
        let bystander = guardians
            .insert(Guardian::creator(creator, other_subject, None))
            .await
            .unwrap();
        let mut heir = guardians
            .insert(Guardian::invitation(
                Uuid::new_v4(),
                subject,
                GuardianRole::Secondary,
                creator,
                None,
            ))
            .await
            .unwrap();
        heir.accept(Utc::now()).unwrap();
        let heir = guardians
            .apply(vec![GuardianChange::Update(heir)])
            .await
            .unwrap()
            .remove(0);

        // Promoting the heir without demoting the primary fails as a whole
        let mut promoted = heir.clone();
        promoted.assign_role(GuardianRole::Primary);
        let result = guardians
            .apply(vec![
                GuardianChange::Delete {
                    id: bystander.id,
                    version: bystander.version,
                },
                GuardianChange::Update(promoted.clone()),
            ])
            .await;
        assert!(matches!(result, Err(CareHubError::InvalidState(_))));
        assert!(guardians.find_by_id(bystander.id).await.unwrap().is_some());
        let unchanged = guardians.find_by_id(heir.id).await.unwrap().unwrap();
        assert_eq!(unchanged.role(), GuardianRole::Secondary);
        assert_eq!(unchanged.version, heir.version);

        // Demoting in the same batch hands the role over
        let mut demoted = primary.clone();
        demoted.assign_role(GuardianRole::Secondary);
        guardians
            .apply(vec![
                GuardianChange::Update(promoted),
                GuardianChange::Update(demoted),
            ])
            .await
            .unwrap();
        let current = guardians
            .find_accepted_primary(subject)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, heir.id);

        // A record deleted earlier in the batch cannot be updated later in it
        let stored = guardians.find_by_id(heir.id).await.unwrap().unwrap();
        let result = guardians
            .apply(vec![
                GuardianChange::Delete {
                    id: stored.id,
                    version: stored.version,
                },
                GuardianChange::Update(stored.clone()),
            ])
            .await;
        assert!(matches!(result, Err(CareHubError::ResourceNotFound(_))));
        assert!(guardians.find_by_id(heir.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_email_is_unique_case_insensitive() {
        let storage = MemoryStorageProvider::new();
        let users = storage.users();

        let user = users
            .create_user(User::new("Ana@example.com".to_string(), "Ana".to_string()))
            .await
            .unwrap();
        assert!(users
            .create_user(User::new("ana@example.com".to_string(), "Other".to_string()))
            .await
            .is_err());
        assert_eq!(
            users.find_by_email("ANA@example.com").await.unwrap().unwrap().id,
            user.id
        );
    }
}
