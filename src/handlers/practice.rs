// src/handlers/practice.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::practice::{PracticeAnswerRequest, PracticeQuestionParams},
    state::AppState,
    utils::jwt::Claims,
};

/// Draws practice questions.
///
/// Query Params:
/// * `category`: optional, e.g. `VERBAL_ABILITY`.
/// * `difficulty`: optional, `EASY` | `MEDIUM` | `HARD`.
/// * `count`: 1..=50, default 10.
pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<PracticeQuestionParams>,
) -> Result<impl IntoResponse, AppError> {
    let questions = state.practice.practice_questions(params).await?;
    Ok(Json(questions))
}

/// Grades one practice answer. Consumes one unit of the daily practice quota.
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PracticeAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .practice
        .submit_answer(claims.user_id()?, payload, Utc::now())
        .await?;
    Ok(Json(result))
}

pub async fn view_explanation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let explanation = state
        .practice
        .view_explanation(claims.user_id()?, id, Utc::now())
        .await?;
    Ok(Json(explanation))
}
