// src/handlers/analytics.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{
        analytics::{LimitParams, TopicParams},
        identity::Identity,
    },
    services::analytics,
    store::Store,
};

pub async fn get_stats(
    State(store): State<Arc<dyn Store>>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(analytics::user_stats(store.as_ref(), &identity, user_id).await?))
}

pub async fn get_subject_performance(
    State(store): State<Arc<dyn Store>>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        analytics::subject_performance(store.as_ref(), &identity, user_id).await?,
    ))
}

/// Per-topic accuracy, optionally for one subject.
pub async fn get_topic_performance(
    State(store): State<Arc<dyn Store>>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
    Query(params): Query<TopicParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        analytics::topic_performance(store.as_ref(), &identity, user_id, params.subject_id).await?,
    ))
}

pub async fn get_recent_activity(
    State(store): State<Arc<dyn Store>>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        analytics::recent_activity(store.as_ref(), &identity, user_id, params.limit).await?,
    ))
}

/// Tests the user has not attempted yet.
pub async fn get_upcoming_tests(
    State(store): State<Arc<dyn Store>>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        analytics::upcoming_tests(store.as_ref(), &identity, user_id, params.limit).await?,
    ))
}
