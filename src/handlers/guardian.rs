//! Care subject and guardian endpoints

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use super::{json_response, reject, with_caller, with_state, AckResponse, Caller};
use crate::app_state::AppState;
use crate::guardian::model::{CareSubject, Guardian, GuardianRole, Permission};

#[derive(Debug, Deserialize)]
pub struct CreateCareSubjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CareSubjectCreatedResponse {
    pub care_subject: CareSubject,
    pub guardian: Guardian,
}

#[derive(Debug, Deserialize)]
pub struct InviteGuardianRequest {
    pub invitee_email: String,
    pub role: GuardianRole,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: GuardianRole,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub care_subject_id: Uuid,
    pub has_access: bool,
}

#[derive(Debug, Serialize)]
pub struct PermissionResponse {
    pub care_subject_id: Uuid,
    pub permission: Permission,
    pub granted: bool,
}

pub async fn handle_create_subject(
    request: CreateCareSubjectRequest,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let (care_subject, guardian) = state
        .care_subjects
        .create(caller.user_id, &request.name)
        .await
        .map_err(reject)?;
    Ok(json_response(
        &CareSubjectCreatedResponse {
            care_subject,
            guardian,
        },
        StatusCode::CREATED,
    ))
}

pub async fn handle_list_subjects(caller: Caller, state: AppState) -> Result<Response, Rejection> {
    let subjects = state
        .care_subjects
        .list_accessible(caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&subjects, StatusCode::OK))
}

pub async fn handle_get_subject(
    care_subject_id: Uuid,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let subject = state
        .care_subjects
        .get(care_subject_id, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&subject, StatusCode::OK))
}

pub async fn handle_deactivate_subject(
    care_subject_id: Uuid,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let subject = state
        .care_subjects
        .deactivate(care_subject_id, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&subject, StatusCode::OK))
}

pub async fn handle_check_access(
    care_subject_id: Uuid,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let has_access = state
        .evaluator
        .has_access(care_subject_id, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(
        &AccessResponse {
            care_subject_id,
            has_access,
        },
        StatusCode::OK,
    ))
}

pub async fn handle_check_permission(
    care_subject_id: Uuid,
    permission: String,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let permission: Permission = permission.parse().map_err(reject)?;
    let granted = state
        .evaluator
        .has_permission(care_subject_id, caller.user_id, permission)
        .await
        .map_err(reject)?;
    Ok(json_response(
        &PermissionResponse {
            care_subject_id,
            permission,
            granted,
        },
        StatusCode::OK,
    ))
}

pub async fn handle_list_guardians(
    care_subject_id: Uuid,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let guardians = state
        .guardians
        .guardians_of_subject(care_subject_id, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&guardians, StatusCode::OK))
}

pub async fn handle_invite(
    care_subject_id: Uuid,
    request: InviteGuardianRequest,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let guardian = state
        .guardians
        .invite(
            care_subject_id,
            caller.user_id,
            &request.invitee_email,
            request.role,
            request.memo,
        )
        .await
        .map_err(reject)?;
    Ok(json_response(&guardian, StatusCode::CREATED))
}

pub async fn handle_my_guardianships(caller: Caller, state: AppState) -> Result<Response, Rejection> {
    let guardians = state
        .guardians
        .guardianships_of(caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&guardians, StatusCode::OK))
}

pub async fn handle_pending_invitations(caller: Caller, state: AppState) -> Result<Response, Rejection> {
    let guardians = state
        .guardians
        .pending_invitations(caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&guardians, StatusCode::OK))
}

pub async fn handle_accept(guardian_id: Uuid, caller: Caller, state: AppState) -> Result<Response, Rejection> {
    let guardian = state
        .guardians
        .accept(guardian_id, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&guardian, StatusCode::OK))
}

pub async fn handle_reject(guardian_id: Uuid, caller: Caller, state: AppState) -> Result<Response, Rejection> {
    let guardian = state
        .guardians
        .reject(guardian_id, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&guardian, StatusCode::OK))
}

pub async fn handle_update_role(
    guardian_id: Uuid,
    request: UpdateRoleRequest,
    caller: Caller,
    state: AppState,
) -> Result<Response, Rejection> {
    let guardian = state
        .guardians
        .update_role(guardian_id, request.role, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&guardian, StatusCode::OK))
}

pub async fn handle_remove(guardian_id: Uuid, caller: Caller, state: AppState) -> Result<Response, Rejection> {
    state
        .guardians
        .remove(guardian_id, caller.user_id)
        .await
        .map_err(reject)?;
    Ok(json_response(&AckResponse::ok("Guardian removed"), StatusCode::OK))
}

/// Routes under `/api/care-subjects` and `/api/guardians`
pub fn routes(state: AppState) -> BoxedFilter<(Response,)> {
    let caller = with_caller(state.clone());
    let state = with_state(state);

    let create_subject = warp::path!("care-subjects")
        .and(warp::post())
        .and(warp::body::json())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_create_subject);

    let list_subjects = warp::path!("care-subjects")
        .and(warp::get())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_list_subjects);

    let get_subject = warp::path!("care-subjects" / Uuid)
        .and(warp::get())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_get_subject);

    let deactivate_subject = warp::path!("care-subjects" / Uuid)
        .and(warp::delete())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_deactivate_subject);

    let check_access = warp::path!("care-subjects" / Uuid / "access")
        .and(warp::get())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_check_access);

    let check_permission = warp::path!("care-subjects" / Uuid / "permissions" / String)
        .and(warp::get())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_check_permission);

    let list_guardians = warp::path!("care-subjects" / Uuid / "guardians")
        .and(warp::get())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_list_guardians);

    let invite = warp::path!("care-subjects" / Uuid / "guardians")
        .and(warp::post())
        .and(warp::body::json())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_invite);

    let my_guardianships = warp::path!("guardians" / "me")
        .and(warp::get())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_my_guardianships);

    let pending = warp::path!("guardians" / "invitations")
        .and(warp::get())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_pending_invitations);

    let accept = warp::path!("guardians" / Uuid / "accept")
        .and(warp::post())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_accept);

    let reject_invitation = warp::path!("guardians" / Uuid / "reject")
        .and(warp::post())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_reject);

    let update_role = warp::path!("guardians" / Uuid / "role")
        .and(warp::put())
        .and(warp::body::json())
        .and(caller.clone())
        .and(state.clone())
        .and_then(handle_update_role);

    let remove = warp::path!("guardians" / Uuid)
        .and(warp::delete())
        .and(caller)
        .and(state)
        .and_then(handle_remove);

    let subjects = create_subject
        .or(list_subjects)
        .unify()
        .or(get_subject)
        .unify()
        .or(deactivate_subject)
        .unify()
        .or(check_access)
        .unify()
        .or(check_permission)
        .unify()
        .or(list_guardians)
        .unify()
        .or(invite)
        .unify()
        .boxed();

    let guardians = my_guardianships
        .or(pending)
        .unify()
        .or(accept)
        .unify()
        .or(reject_invitation)
        .unify()
        .or(update_role)
        .unify()
        .or(remove)
        .unify()
        .boxed();

    subjects.or(guardians).unify().boxed()
}
