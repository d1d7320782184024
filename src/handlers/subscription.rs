// src/handlers/subscription.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use crate::{
    error::AppError, models::user::RedeemCodeRequest, state::AppState, utils::jwt::Claims,
};

/// Season Pass state, tier limits and today's usage.
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .subscriptions
        .status(claims.user_id()?, Utc::now())
        .await?;
    Ok(Json(status))
}

pub async fn redeem_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RedeemCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .subscriptions
        .redeem(claims.user_id()?, payload, Utc::now())
        .await?;
    Ok(Json(status))
}
