// src/routes.rs

use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::{get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{analytics, mock_exam, practice, streak, subscription},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Every route requires a bearer token.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        header::HeaderValue::from_static("http://localhost:3000"),
        header::HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    // Static segments are matched before `{id}`.
    let mock_exam_routes = Router::new()
        .route("/", post(mock_exam::create_exam))
        .route("/in-progress", get(mock_exam::in_progress))
        .route("/limits", get(mock_exam::limits))
        .route("/history", get(mock_exam::history))
        .route("/{id}", get(mock_exam::get_exam))
        .route("/{id}/answers", post(mock_exam::save_answer))
        .route("/{id}/flag", patch(mock_exam::toggle_flag))
        .route("/{id}/submit", post(mock_exam::submit_exam))
        .route("/{id}/results", get(mock_exam::get_results))
        .route("/{id}/abandon", post(mock_exam::abandon_exam));

    let practice_routes = Router::new()
        .route("/questions", get(practice::list_questions))
        .route("/questions/{id}/explanation", get(practice::view_explanation))
        .route("/answers", post(practice::submit_answer));

    let streak_routes = Router::new()
        .route("/", get(streak::get_streak))
        .route("/repair", post(streak::repair_streak));

    let analytics_routes = Router::new()
        .route("/dashboard", get(analytics::dashboard))
        .route("/categories", get(analytics::categories))
        .route("/weekly", get(analytics::weekly));

    let subscription_routes = Router::new()
        .route("/", get(subscription::get_subscription))
        .route("/redeem", post(subscription::redeem_code));

    let api = Router::new()
        .nest("/mock-exams", mock_exam_routes)
        .nest("/practice", practice_routes)
        .nest("/streak", streak_routes)
        .nest("/analytics", analytics_routes)
        .nest("/subscription", subscription_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
