// src/handlers/streak.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use crate::{error::AppError, state::AppState, utils::jwt::Claims};

pub async fn get_streak(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .streaks
        .get_status(claims.user_id()?, Utc::now())
        .await?;
    Ok(Json(status))
}

/// Repairs a streak broken by exactly one missed day.
pub async fn repair_streak(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.streaks.repair(claims.user_id()?, Utc::now()).await?;
    Ok(Json(outcome))
}
