mod common;

use carehub_core::error::CareHubError;
use carehub_core::guardian::model::{GuardianRole, GuardianStatus, Permission};
use futures_util::future::join;

use common::*;

#[tokio::test]
async fn test_creator_becomes_primary_guardian() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;

    let (subject, guardian) = state
        .care_subjects
        .create(creator.id, "Grandpa Lee")
        .await
        .unwrap();

    assert_eq!(guardian.role(), GuardianRole::Primary);
    assert_eq!(guardian.status(), GuardianStatus::Accepted);
    assert_eq!(guardian.memo.as_deref(), Some("care subject creator"));
    assert_eq!(accepted_primaries(&state, &subject).await.len(), 1);
}

#[tokio::test]
async fn test_creator_holds_every_permission() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let subject = care_subject(&state, &creator).await;

    // Even with the creator's guardian record gone, creation alone grants everything
    let helper = user(&state, "helper@example.com").await;
    accepted_guardian(&state, &subject, &creator, &helper, GuardianRole::Secondary).await;
    let own = state
        .storage
        .guardians()
        .find_by_user_and_subject(creator.id, subject.id)
        .await
        .unwrap()
        .unwrap();
    state.guardians.remove(own.id, creator.id).await.unwrap();

    for permission in Permission::ALL {
        assert!(state
            .evaluator
            .has_permission(subject.id, creator.id, permission)
            .await
            .unwrap());
    }
    assert!(state.evaluator.has_access(subject.id, creator.id).await.unwrap());
}

#[tokio::test]
async fn test_temporary_guardian_permissions() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let sitter = user(&state, "sitter@example.com").await;
    let subject = care_subject(&state, &creator).await;

    accepted_guardian(&state, &subject, &creator, &sitter, GuardianRole::Temporary).await;

    let evaluator = &state.evaluator;
    assert!(!evaluator
        .has_permission(subject.id, sitter.id, Permission::ManageSchedule)
        .await
        .unwrap());
    assert!(evaluator
        .has_permission(subject.id, sitter.id, Permission::RecordActivities)
        .await
        .unwrap());
    assert!(evaluator.has_access(subject.id, sitter.id).await.unwrap());
}

#[tokio::test]
async fn test_pending_guardian_has_no_access() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let invitee = user(&state, "invitee@example.com").await;
    let subject = care_subject(&state, &creator).await;

    let invitation = state
        .guardians
        .invite(subject.id, creator.id, &invitee.email, GuardianRole::Secondary, Some("nephew".to_string()))
        .await
        .unwrap();

    assert_eq!(invitation.status(), GuardianStatus::Pending);
    assert!(!state.evaluator.has_access(subject.id, invitee.id).await.unwrap());
    assert_eq!(
        state.guardians.pending_invitations(invitee.id).await.unwrap().len(),
        1
    );
    assert!(matches!(
        state.guardians.guardians_of_subject(subject.id, invitee.id).await,
        Err(CareHubError::AccessDenied(_))
    ));
}

#[tokio::test]
async fn test_invite_guards() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let secondary = user(&state, "secondary@example.com").await;
    let invitee = user(&state, "invitee@example.com").await;
    let subject = care_subject(&state, &creator).await;

    accepted_guardian(&state, &subject, &creator, &secondary, GuardianRole::Secondary).await;

    // SECONDARY lacks MANAGE_GUARDIANS
    assert!(matches!(
        state
            .guardians
            .invite(subject.id, secondary.id, &invitee.email, GuardianRole::Temporary, None)
            .await,
        Err(CareHubError::AccessDenied(_))
    ));

    // Existing record of any status blocks a second invitation
    assert!(matches!(
        state
            .guardians
            .invite(subject.id, creator.id, &secondary.email, GuardianRole::Temporary, None)
            .await,
        Err(CareHubError::InvalidState(_))
    ));

    // Only one ACCEPTED PRIMARY
    assert!(matches!(
        state
            .guardians
            .invite(subject.id, creator.id, &invitee.email, GuardianRole::Primary, None)
            .await,
        Err(CareHubError::InvalidState(_))
    ));

    assert!(matches!(
        state
            .guardians
            .invite(subject.id, creator.id, "nobody@example.com", GuardianRole::Temporary, None)
            .await,
        Err(CareHubError::ResourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_accept_and_reject_resolve_once() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let first = user(&state, "first@example.com").await;
    let second = user(&state, "second@example.com").await;
    let subject = care_subject(&state, &creator).await;

    let a = state
        .guardians
        .invite(subject.id, creator.id, &first.email, GuardianRole::Secondary, None)
        .await
        .unwrap();
    let b = state
        .guardians
        .invite(subject.id, creator.id, &second.email, GuardianRole::Secondary, None)
        .await
        .unwrap();

    // Someone else cannot answer
    assert!(matches!(
        state.guardians.accept(a.id, second.id).await,
        Err(CareHubError::AccessDenied(_))
    ));

    let accepted = state.guardians.accept(a.id, first.id).await.unwrap();
    assert!(accepted.accepted_at.is_some());
    assert!(matches!(
        state.guardians.accept(a.id, first.id).await,
        Err(CareHubError::InvalidState(_))
    ));
    assert!(matches!(
        state.guardians.reject(a.id, first.id).await,
        Err(CareHubError::InvalidState(_))
    ));

    let rejected = state.guardians.reject(b.id, second.id).await.unwrap();
    assert_eq!(rejected.status(), GuardianStatus::Rejected);
    assert!(rejected.rejected_at.is_some());
    assert!(matches!(
        state.guardians.accept(b.id, second.id).await,
        Err(CareHubError::InvalidState(_))
    ));
    assert_eq!(state.security.event_count("invitation_conflict").await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accept_and_reject_commit_once() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let invitee = user(&state, "invitee@example.com").await;
    let subject = care_subject(&state, &creator).await;

    for _ in 0..20 {
        let invitation = state
            .guardians
            .invite(subject.id, creator.id, &invitee.email, GuardianRole::Secondary, None)
            .await
            .unwrap();

        let (accepted, rejected) = join(
            state.guardians.accept(invitation.id, invitee.id),
            state.guardians.reject(invitation.id, invitee.id),
        )
        .await;

        assert!(accepted.is_ok() != rejected.is_ok());
        let failure = accepted.err().or(rejected.err()).unwrap();
        assert!(matches!(failure, CareHubError::InvalidState(_)));

        let stored = state
            .storage
            .guardians()
            .find_by_id(invitation.id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.status(), GuardianStatus::Pending);
        assert_eq!(stored.version, 1);

        state.guardians.remove(invitation.id, creator.id).await.unwrap();
    }
}

#[tokio::test]
async fn test_update_role_recomputes_permissions() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let helper = user(&state, "helper@example.com").await;
    let subject = care_subject(&state, &creator).await;

    let guardian =
        accepted_guardian(&state, &subject, &creator, &helper, GuardianRole::Secondary).await;
    assert!(state
        .evaluator
        .has_permission(subject.id, helper.id, Permission::ManageSchedule)
        .await
        .unwrap());

    let updated = state
        .guardians
        .update_role(guardian.id, GuardianRole::Temporary, creator.id)
        .await
        .unwrap();
    assert_eq!(*updated.permissions(), GuardianRole::Temporary.permissions());
    assert!(!state
        .evaluator
        .has_permission(subject.id, helper.id, Permission::ManageSchedule)
        .await
        .unwrap());

    // Only the PRIMARY may change roles
    assert!(matches!(
        state
            .guardians
            .update_role(guardian.id, GuardianRole::Secondary, helper.id)
            .await,
        Err(CareHubError::AccessDenied(_))
    ));

    // No second PRIMARY, and the PRIMARY cannot be demoted
    assert!(matches!(
        state
            .guardians
            .update_role(guardian.id, GuardianRole::Primary, creator.id)
            .await,
        Err(CareHubError::InvalidState(_))
    ));
    let primary = accepted_primaries(&state, &subject).await.remove(0);
    assert!(matches!(
        state
            .guardians
            .update_role(primary.id, GuardianRole::Secondary, creator.id)
            .await,
        Err(CareHubError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_sole_primary_cannot_leave_until_another_guardian_accepts() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let helper = user(&state, "helper@example.com").await;
    let subject = care_subject(&state, &creator).await;
    let primary = accepted_primaries(&state, &subject).await.remove(0);

    assert!(matches!(
        state.guardians.remove(primary.id, creator.id).await,
        Err(CareHubError::InvalidState(_))
    ));

    // A pending invitation does not count
    let invitation = state
        .guardians
        .invite(subject.id, creator.id, &helper.email, GuardianRole::Secondary, None)
        .await
        .unwrap();
    assert!(matches!(
        state.guardians.remove(primary.id, creator.id).await,
        Err(CareHubError::InvalidState(_))
    ));

    state.guardians.accept(invitation.id, helper.id).await.unwrap();
    state.guardians.remove(primary.id, creator.id).await.unwrap();

    let primaries = accepted_primaries(&state, &subject).await;
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].user_id, helper.id);
    assert!(state
        .evaluator
        .has_permission(subject.id, helper.id, Permission::ManageGuardians)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_remove_authorization() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let a = user(&state, "a@example.com").await;
    let b = user(&state, "b@example.com").await;
    let subject = care_subject(&state, &creator).await;

    let ga = accepted_guardian(&state, &subject, &creator, &a, GuardianRole::Secondary).await;
    let gb = accepted_guardian(&state, &subject, &creator, &b, GuardianRole::Temporary).await;

    // A non-primary cannot remove someone else
    assert!(matches!(
        state.guardians.remove(gb.id, a.id).await,
        Err(CareHubError::AccessDenied(_))
    ));

    // Self-removal
    state.guardians.remove(ga.id, a.id).await.unwrap();
    assert!(!state.evaluator.has_access(subject.id, a.id).await.unwrap());

    // Primary removes another guardian
    state.guardians.remove(gb.id, creator.id).await.unwrap();
    assert_eq!(
        state
            .guardians
            .guardians_of_subject(subject.id, creator.id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(matches!(
        state.guardians.remove(gb.id, creator.id).await,
        Err(CareHubError::ResourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_exactly_one_primary_after_mixed_operations() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let subject = care_subject(&state, &creator).await;

    let mut helpers = Vec::new();
    for i in 0..4 {
        helpers.push(user(&state, &format!("helper{}@example.com", i)).await);
    }

    let g0 = accepted_guardian(&state, &subject, &creator, &helpers[0], GuardianRole::Secondary).await;
    let g1 = accepted_guardian(&state, &subject, &creator, &helpers[1], GuardianRole::Temporary).await;
    assert_eq!(accepted_primaries(&state, &subject).await.len(), 1);

    // A PRIMARY invitation cannot be created while one exists
    assert!(state
        .guardians
        .invite(subject.id, creator.id, &helpers[2].email, GuardianRole::Primary, None)
        .await
        .is_err());
    assert_eq!(accepted_primaries(&state, &subject).await.len(), 1);

    state
        .guardians
        .update_role(g1.id, GuardianRole::Secondary, creator.id)
        .await
        .unwrap();
    assert_eq!(accepted_primaries(&state, &subject).await.len(), 1);

    // Creator leaves; the longest-standing guardian takes over
    let creator_record = accepted_primaries(&state, &subject).await.remove(0);
    state.guardians.remove(creator_record.id, creator.id).await.unwrap();
    let primaries = accepted_primaries(&state, &subject).await;
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, g0.id);

    // The new primary manages guardians
    state
        .guardians
        .remove(g1.id, helpers[0].id)
        .await
        .unwrap();
    accepted_guardian(&state, &subject, &helpers[0], &helpers[3], GuardianRole::Temporary).await;
    assert_eq!(accepted_primaries(&state, &subject).await.len(), 1);
}

#[tokio::test]
async fn test_accessible_subjects_and_deactivation() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let helper = user(&state, "helper@example.com").await;
    let outsider = user(&state, "outsider@example.com").await;
    let subject = care_subject(&state, &creator).await;

    accepted_guardian(&state, &subject, &creator, &helper, GuardianRole::Secondary).await;

    assert_eq!(
        state.care_subjects.list_accessible(creator.id).await.unwrap().len(),
        1
    );
    assert_eq!(
        state.evaluator.accessible_subjects(helper.id).await.unwrap()[0].id,
        subject.id
    );
    assert!(state
        .evaluator
        .accessible_subjects(outsider.id)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        state.care_subjects.get(subject.id, outsider.id).await,
        Err(CareHubError::AccessDenied(_))
    ));

    // SECONDARY lacks DELETE_CARE_SUBJECT
    assert!(matches!(
        state.care_subjects.deactivate(subject.id, helper.id).await,
        Err(CareHubError::AccessDenied(_))
    ));
    assert!(state.security.event_count("permission_denied").await >= 2);

    state.care_subjects.deactivate(subject.id, creator.id).await.unwrap();
    assert!(state
        .evaluator
        .accessible_subjects(helper.id)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        state
            .guardians
            .invite(subject.id, creator.id, &outsider.email, GuardianRole::Temporary, None)
            .await,
        Err(CareHubError::ResourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_only_accepted_guardians_change_role() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;
    let pending_user = user(&state, "pending@example.com").await;
    let rejecting_user = user(&state, "rejecting@example.com").await;
    let subject = care_subject(&state, &creator).await;

    let pending = state
        .guardians
        .invite(subject.id, creator.id, &pending_user.email, GuardianRole::Temporary, None)
        .await
        .unwrap();
    let rejected = state
        .guardians
        .invite(subject.id, creator.id, &rejecting_user.email, GuardianRole::Temporary, None)
        .await
        .unwrap();
    state.guardians.reject(rejected.id, rejecting_user.id).await.unwrap();

    for id in [pending.id, rejected.id] {
        assert!(matches!(
            state
                .guardians
                .update_role(id, GuardianRole::Secondary, creator.id)
                .await,
            Err(CareHubError::InvalidState(_))
        ));
        let stored = state.storage.guardians().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.role(), GuardianRole::Temporary);
    }
}

#[tokio::test]
async fn test_blank_care_subject_name_is_invalid_input() {
    let state = app();
    let creator = user(&state, "creator@example.com").await;

    assert!(matches!(
        state.care_subjects.create(creator.id, "   ").await,
        Err(CareHubError::InvalidInput(_))
    ));
    assert!(state
        .care_subjects
        .list_accessible(creator.id)
        .await
        .unwrap()
        .is_empty());
}
