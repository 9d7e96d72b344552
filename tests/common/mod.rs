#![allow(dead_code)]

use carehub_core::auth::provider::hash_password;
use carehub_core::auth::user::User;
use carehub_core::config::ServerConfig;
use carehub_core::guardian::model::{CareSubject, Guardian, GuardianRole, GuardianStatus};
use carehub_core::AppState;

pub const PASSWORD: &str = "c0rrect-h0rse-battery";

pub fn app() -> AppState {
    AppState::in_memory(&ServerConfig::for_testing())
}

/// A user without a password, enough for guardian scenarios
pub async fn user(state: &AppState, email: &str) -> User {
    state
        .storage
        .users()
        .create_user(User::new(email.to_string(), email.to_string()))
        .await
        .unwrap()
}

/// A user that can log in with [`PASSWORD`]
pub async fn user_with_password(state: &AppState, email: &str) -> User {
    state
        .storage
        .users()
        .create_user(User::with_password_hash(
            email.to_string(),
            email.to_string(),
            hash_password(PASSWORD).unwrap(),
        ))
        .await
        .unwrap()
}

pub async fn care_subject(state: &AppState, creator: &User) -> CareSubject {
    state
        .care_subjects
        .create(creator.id, "Grandma Kim")
        .await
        .unwrap()
        .0
}

/// Invite `invitee` with `role` and accept on their behalf
pub async fn accepted_guardian(
    state: &AppState,
    subject: &CareSubject,
    inviter: &User,
    invitee: &User,
    role: GuardianRole,
) -> Guardian {
    let invitation = state
        .guardians
        .invite(subject.id, inviter.id, &invitee.email, role, None)
        .await
        .unwrap();
    state.guardians.accept(invitation.id, invitee.id).await.unwrap()
}

pub async fn accepted_primaries(state: &AppState, subject: &CareSubject) -> Vec<Guardian> {
    state
        .storage
        .guardians()
        .find_by_subject(subject.id, Some(GuardianStatus::Accepted))
        .await
        .unwrap()
        .into_iter()
        .filter(|g| g.role() == GuardianRole::Primary)
        .collect()
}
