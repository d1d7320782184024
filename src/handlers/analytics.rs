// src/handlers/analytics.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use crate::{error::AppError, state::AppState, utils::jwt::Claims};

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.analytics.dashboard(claims.user_id()?).await?;
    Ok(Json(stats))
}

pub async fn categories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.analytics.categories(claims.user_id()?).await?;
    Ok(Json(stats))
}

/// Activity for the last seven local days, oldest first.
pub async fn weekly(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let days = state
        .analytics
        .weekly(claims.user_id()?, Utc::now())
        .await?;
    Ok(Json(days))
}
