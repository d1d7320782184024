// src/handlers/mock_exam.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    config::DEFAULT_HISTORY_LIMIT,
    error::AppError,
    models::exam_session::{CreateMockExamRequest, HistoryParams, SaveAnswerRequest, ToggleFlagRequest},
    state::AppState,
    utils::jwt::Claims,
};

const MAX_HISTORY_LIMIT: i64 = 100;

/// Starts a timed mock exam.
///
/// Returns 201 with the session view (questions without answer keys).
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateMockExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let view = state
        .engine
        .create_session(user_id, payload, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .engine
        .get_state(claims.user_id()?, id, Utc::now())
        .await?;
    Ok(Json(view))
}

pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let update = state
        .engine
        .save_answer(claims.user_id()?, id, payload, Utc::now())
        .await?;
    Ok(Json(update))
}

pub async fn toggle_flag(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ToggleFlagRequest>,
) -> Result<impl IntoResponse, AppError> {
    let update = state
        .engine
        .toggle_flag(claims.user_id()?, id, payload, Utc::now())
        .await?;
    Ok(Json(update))
}

/// Submits the exam and returns the scored breakdown.
pub async fn submit_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let results = state
        .engine
        .submit(claims.user_id()?, id, Utc::now())
        .await?;
    Ok(Json(results))
}

pub async fn get_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let results = state.engine.get_results(claims.user_id()?, id).await?;
    Ok(Json(results))
}

pub async fn abandon_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.engine.abandon(claims.user_id()?, id).await?;
    Ok(Json(entry))
}

/// The caller's live session, or `{"session": null}`.
pub async fn in_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .engine
        .check_in_progress(claims.user_id()?, Utc::now())
        .await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn limits(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let limits = state.engine.limits(claims.user_id()?, Utc::now()).await?;
    Ok(Json(limits))
}

/// Lists the caller's sessions, newest first.
///
/// Query Params:
/// * `limit`: default 20, clamped to 1..=100.
pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let entries = state.engine.history(claims.user_id()?, limit).await?;
    Ok(Json(entries))
}
