use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use talkto_core::AppState;

use crate::error::ApiError;

/// Caller identity taken from a validated `Authorization: Bearer` token.
pub struct AuthUser {
    pub user_id: i64,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let claims = talkto_core::auth::validate_token(token, &state.config.jwt_secret)
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}
