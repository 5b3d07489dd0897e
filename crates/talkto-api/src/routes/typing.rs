use axum::{extract::State, Json};
use talkto_core::{parse_id, AppState};
use talkto_models::api::{OkResponse, TypingRequest};

use crate::error::ApiError;
use crate::middleware::AuthUser;

/// Always answers `{ok: true}` to participants and outsiders alike; only
/// participants under the rate limit are broadcast.
pub async fn typing(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<TypingRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let room_id = parse_id(&body.room_id)?;
    if let Some(payload) = talkto_core::typing::typing_signal(
        &state.db,
        &state.typing_limiter,
        room_id,
        auth.user_id,
        body.source,
    )
    .await?
    {
        state.event_bus.dispatch_typing(room_id, payload);
    }
    Ok(Json(OkResponse { ok: true }))
}
