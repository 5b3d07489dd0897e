use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use talkto_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("rate limited")]
    RateLimited,
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        (status, Json(json!({ "error": code, "message": self.to_string() }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound => ApiError::NotFound,
            CoreError::Forbidden => ApiError::Forbidden,
            CoreError::InvalidCursor => ApiError::BadRequest("invalid cursor".into()),
            CoreError::BadRequest(msg) => ApiError::BadRequest(msg),
            CoreError::Policy(violation) => ApiError::BadRequest(violation.to_string()),
            CoreError::Validation(err) => ApiError::BadRequest(err.to_string()),
            CoreError::RateLimited => ApiError::RateLimited,
            CoreError::Database(err) => ApiError::Internal(anyhow::anyhow!(err)),
            CoreError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<talkto_db::DbError> for ApiError {
    fn from(e: talkto_db::DbError) -> Self {
        match e {
            talkto_db::DbError::NotFound => ApiError::NotFound,
            talkto_db::DbError::Sqlx(err) => ApiError::Internal(anyhow::anyhow!(err)),
        }
    }
}
