//! HTTP handlers for the JSON API
//!
//! Every route lives under `/api`. Authenticated routes match path and
//! method first and only then validate the bearer token, so an unknown path
//! is a 404 rather than a 401.

pub mod auth;
pub mod guardian;

use serde::Serialize;
use std::convert::Infallible;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::app_state::AppState;
use crate::auth::token::extract_bearer_token;
use crate::constants::API_PREFIX;
use crate::error::CareHubError;
use crate::security::api_security_headers;
use crate::security_logger::SecurityEvent;

/// A domain error travelling through warp's rejection chain
#[derive(Debug)]
pub struct ApiRejection(pub CareHubError);

impl warp::reject::Reject for ApiRejection {}

pub fn reject(error: CareHubError) -> Rejection {
    warp::reject::custom(ApiRejection(error))
}

/// Error body returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Body for operations with nothing else to return
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

impl AckResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Authenticated caller, established from a validated access token
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub access_token: String,
}

pub fn json_response<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn authenticate(header: Option<String>, state: AppState) -> Result<Caller, Rejection> {
    let token = header
        .as_deref()
        .and_then(extract_bearer_token)
        .ok_or_else(|| reject(CareHubError::InvalidToken("missing bearer token".to_string())))?;

    match state.tokens.validate_access(token).await {
        Ok(claims) => Ok(Caller {
            user_id: claims.user_id().map_err(reject)?,
            access_token: token.to_string(),
        }),
        Err(e) => {
            state
                .security
                .log_event(SecurityEvent::TokenRejected {
                    reason: e.to_string(),
                })
                .await;
            Err(reject(e))
        }
    }
}

/// Requires a valid access token in the Authorization header
pub fn with_caller(state: AppState) -> impl Filter<Extract = (Caller,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(authenticate)
}

/// The complete API with error recovery
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    let api = warp::path(API_PREFIX).and(
        auth::routes(state.clone())
            .or(guardian::routes(state))
            .unify(),
    );

    health
        .map(|reply: &'static str| reply.into_response())
        .or(api)
        .unify()
        .recover(handle_rejection)
        .with(warp::reply::with::headers(api_security_headers()))
}

/// Map rejections to `{code, message}` bodies
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if let Some(ApiRejection(error)) = err.find::<ApiRejection>() {
        let status = StatusCode::from_u16(error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {}", error);
        }
        (status, error.error_code().to_string(), error.public_message())
    } else if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            "NOT_FOUND".to_string(),
            "Route not found".to_string(),
        )
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST".to_string(), e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, "BAD_REQUEST".to_string(), e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED".to_string(),
            "Method not allowed".to_string(),
        )
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR".to_string(),
            "Internal server error".to_string(),
        )
    };

    Ok(json_response(&ErrorResponse { code, message }, status))
}
