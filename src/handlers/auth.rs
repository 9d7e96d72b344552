//! Authentication endpoints: login, refresh, logout, email verification
//! and registration

use serde::{Deserialize, Serialize};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use super::{json_response, reject, with_caller, with_state, AckResponse, Caller};
use crate::app_state::AppState;
use crate::auth::coordinator::{LoginRequest, LogoutRequest};
use crate::auth::token::extract_bearer_token;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Logout body; the access token comes from the Authorization header
#[derive(Debug, Default, Deserialize)]
pub struct LogoutBody {
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub success: bool,
    pub sessions_deleted: usize,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub verification_code: String,
}

#[derive(Debug, Serialize)]
pub struct EmailAvailabilityResponse {
    pub email: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct EmailVerificationResponse {
    pub verified: bool,
    pub verification_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub verification_token: String,
}

pub async fn handle_login(request: LoginRequest, state: AppState) -> Result<Response, Rejection> {
    let bundle = state.auth.login(request).await.map_err(reject)?;
    Ok(json_response(&bundle, StatusCode::OK))
}

pub async fn handle_refresh(request: RefreshRequest, state: AppState) -> Result<Response, Rejection> {
    let bundle = state
        .auth
        .refresh(&request.refresh_token, request.device_id.as_deref())
        .await
        .map_err(reject)?;
    Ok(json_response(&bundle, StatusCode::OK))
}

/// Logout must work with an expired access token, so the header is optional
/// and only a token that still validates identifies the caller.
pub async fn handle_logout(
    header: Option<String>,
    body: LogoutBody,
    state: AppState,
) -> Result<Response, Rejection> {
    let access_token = header
        .as_deref()
        .and_then(extract_bearer_token)
        .map(str::to_string);

    let caller_id = match &access_token {
        Some(token) => match state.tokens.validate_access(token).await {
            Ok(claims) => claims.user_id().ok(),
            Err(_) => None,
        },
        None => None,
    };

    state
        .auth
        .logout(LogoutRequest {
            access_token,
            refresh_token: body.refresh_token,
            caller_id,
            device_id: body.device_id,
        })
        .await
        .map_err(reject)?;
    Ok(json_response(&AckResponse::ok("Logged out successfully"), StatusCode::OK))
}

pub async fn handle_logout_all(caller: Caller, state: AppState) -> Result<Response, Rejection> {
    let sessions_deleted = state.auth.logout_all(caller.user_id).await.map_err(reject)?;
    Ok(json_response(
        &LogoutAllResponse {
            success: true,
            sessions_deleted,
        },
        StatusCode::OK,
    ))
}

pub async fn handle_check_email(query: EmailQuery, state: AppState) -> Result<Response, Rejection> {
    let available = state
        .verification
        .email_available(&query.email)
        .await
        .map_err(reject)?;
    Ok(json_response(
        &EmailAvailabilityResponse {
            email: query.email,
            available,
        },
        StatusCode::OK,
    ))
}

pub async fn handle_send_code(request: SendCodeRequest, state: AppState) -> Result<Response, Rejection> {
    state
        .verification
        .issue_code(&request.email)
        .await
        .map_err(reject)?;
    Ok(json_response(
        &AckResponse::ok("Verification code sent"),
        StatusCode::ACCEPTED,
    ))
}

pub async fn handle_verify_code(
    request: VerifyCodeRequest,
    state: AppState,
) -> Result<Response, Rejection> {
    let verification_token = state
        .verification
        .verify_email_code(&request.email, &request.verification_code)
        .await
        .map_err(reject)?;
    Ok(json_response(
        &EmailVerificationResponse {
            verified: true,
            verification_token,
        },
        StatusCode::OK,
    ))
}

pub async fn handle_register(request: RegisterRequest, state: AppState) -> Result<Response, Rejection> {
    let user = state
        .verification
        .register(
            &request.email,
            &request.password,
            &request.name,
            &request.verification_token,
        )
        .await
        .map_err(reject)?;
    Ok(json_response(&user.summary(), StatusCode::CREATED))
}

/// Routes under `/api/auth` plus `/api/users/register`
pub fn routes(state: AppState) -> BoxedFilter<(Response,)> {
    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_login);

    let refresh = warp::path!("auth" / "refresh")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_refresh);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_logout);

    let logout_all = warp::path!("auth" / "logout-all")
        .and(warp::post())
        .and(with_caller(state.clone()))
        .and(with_state(state.clone()))
        .and_then(handle_logout_all);

    let check_email = warp::path!("auth" / "verification" / "email" / "check")
        .and(warp::get())
        .and(warp::query::<EmailQuery>())
        .and(with_state(state.clone()))
        .and_then(handle_check_email);

    let send_code = warp::path!("auth" / "verification" / "email" / "send-code")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_send_code);

    let verify_code = warp::path!("auth" / "verification" / "email" / "verify-code")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(handle_verify_code);

    let register = warp::path!("users" / "register")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_register);

    login
        .or(refresh)
        .unify()
        .or(logout)
        .unify()
        .or(logout_all)
        .unify()
        .or(check_email)
        .unify()
        .or(send_code)
        .unify()
        .or(verify_code)
        .unify()
        .or(register)
        .unify()
        .boxed()
}
