// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{analytics, attempt, catalog},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Catalog routes are public.
/// * Attempt and analytics routes require a bearer token.
/// * Trace and CORS wrap everything.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let catalog_routes = Router::new()
        .route("/exam-types", get(catalog::list_exam_types))
        .route("/subjects", get(catalog::list_subjects))
        .route("/tests", get(catalog::list_tests))
        .route("/tests/{id}", get(catalog::get_test))
        .route("/tests/{id}/questions", get(catalog::get_test_questions));

    let attempt_routes = Router::new()
        .route("/", post(attempt::create_attempt))
        .route(
            "/{id}",
            get(attempt::get_attempt).put(attempt::update_attempt),
        )
        .route("/{id}/submit", post(attempt::submit_attempt));

    let user_routes = Router::new()
        .route("/{user_id}/test-attempts", get(attempt::list_user_attempts))
        .route("/{user_id}/stats", get(analytics::get_stats))
        .route(
            "/{user_id}/subject-performance",
            get(analytics::get_subject_performance),
        )
        .route(
            "/{user_id}/topic-performance",
            get(analytics::get_topic_performance),
        )
        .route(
            "/{user_id}/recent-activity",
            get(analytics::get_recent_activity),
        )
        .route(
            "/{user_id}/upcoming-tests",
            get(analytics::get_upcoming_tests),
        );

    let protected = Router::new()
        .nest("/test-attempts", attempt_routes)
        .nest("/users", user_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", catalog_routes.merge(protected))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
