// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{CreateAttemptRequest, SubmitAttemptRequest, UpdateAttemptRequest},
        identity::Identity,
    },
    services::attempt::AttemptService,
};

/// Starts (or resumes) an attempt for the caller.
///
/// Returns 201 Created for a new attempt, 200 OK when an active one is resumed.
pub async fn create_attempt(
    State(service): State<Arc<AttemptService>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if let Some(user_id) = payload.user_id {
        identity.ensure_user(user_id)?;
    }

    let outcome = service.start(&identity, payload.test_id).await?;
    let status = if outcome.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(outcome.attempt)))
}

/// Autosave. `isCompleted: true` turns the request into a submit.
pub async fn update_attempt(
    State(service): State<Arc<AttemptService>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if payload.is_completed == Some(true) {
        let patch = payload.into_patch();
        return Ok(Json(service.submit_patch(&identity, id, patch).await?));
    }

    Ok(Json(service.update(&identity, id, payload.into_patch()).await?))
}

/// Finalizes and scores an attempt. Repeating it returns the stored result.
pub async fn submit_attempt(
    State(service): State<Arc<AttemptService>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    Ok(Json(service.submit(&identity, id, payload).await?))
}

/// Attempt with its test and questions; the answer key only after completion.
pub async fn get_attempt(
    State(service): State<Arc<AttemptService>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.result(&identity, id).await?))
}

/// All attempts of a user, newest first.
pub async fn list_user_attempts(
    State(service): State<Arc<AttemptService>>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.list(&identity, user_id).await?))
}
