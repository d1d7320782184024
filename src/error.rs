// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::fmt;

use crate::models::access::{Limit, QuotaKind};

/// Details of a denied quota-consuming action.
/// Serialized into the 403 body so clients can explain the limit and the upgrade path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaDenial {
    pub kind: QuotaKind,
    pub limit: Limit,
    pub used: u32,
}

impl QuotaDenial {
    pub fn message(&self) -> String {
        match self.kind {
            QuotaKind::PracticeQuestions => {
                "Daily practice limit reached. Upgrade to the Season Pass for unlimited practice."
            }
            QuotaKind::ExplanationViews => {
                "Daily explanation limit reached. Upgrade to the Season Pass for unlimited explanations."
            }
            QuotaKind::MockExamQuestions => {
                "Requested question count exceeds your plan. Upgrade to the Season Pass for full-length mock exams."
            }
            QuotaKind::MockExamsPerMonth => {
                "Monthly mock exam limit reached. Upgrade to the Season Pass for unlimited mock exams."
            }
        }
        .to_string()
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (malformed or out-of-range input)
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found (also used for records owned by someone else)
    NotFound(String),

    // 409 Conflict (terminal or time-expired session, streak not repairable)
    Conflict(String),

    // 403 Forbidden (tier limit reached)
    QuotaExceeded(QuotaDenial),

    // 422 Unprocessable Entity (question bank cannot fill the request)
    InsufficientContent(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::QuotaExceeded(denial) => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": denial.message(),
                    "quota": denial,
                    "upgrade": "season_pass",
                }),
            ),
            AppError::InsufficientContent(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": msg }))
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
