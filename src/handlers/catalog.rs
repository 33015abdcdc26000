// src/handlers/catalog.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{catalog::SubjectListParams, test::TestFilter},
    services::catalog,
    store::Store,
};

/// List all exam types.
pub async fn list_exam_types(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.list_exam_types().await?))
}

/// List subjects, optionally of one exam type.
pub async fn list_subjects(
    State(store): State<Arc<dyn Store>>,
    Query(params): Query<SubjectListParams>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.list_subjects(params.exam_type_id).await?))
}

/// List tests filtered by `examTypeId` and/or `subjectId`.
pub async fn list_tests(
    State(store): State<Arc<dyn Store>>,
    Query(filter): Query<TestFilter>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.list_tests(filter).await?))
}

/// Test descriptor with its section breakdown.
pub async fn get_test(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(catalog::test_detail(store.as_ref(), id).await?))
}

/// Questions of a test, answer key stripped.
pub async fn get_test_questions(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(catalog::public_questions(store.as_ref(), id).await?))
}
