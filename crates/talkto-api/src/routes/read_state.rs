use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use talkto_core::{parse_id, AppState};
use talkto_models::api::{LastReadAck, LastReadResponse, LastReadUpdate};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastReadParams {
    pub room_id: String,
}

pub async fn get_last_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<LastReadParams>,
) -> Result<Json<LastReadResponse>, ApiError> {
    let room_id = parse_id(&params.room_id)?;
    let last_read_at =
        talkto_core::read_state::get_last_read(&state.db, room_id, auth.user_id).await?;
    Ok(Json(LastReadResponse { last_read_at }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<LastReadUpdate>,
) -> Result<Json<LastReadAck>, ApiError> {
    let room_id = parse_id(&body.room_id)?;
    let applied =
        talkto_core::read_state::mark_read(&state.db, room_id, auth.user_id, body.last_read_at)
            .await?;
    Ok(Json(LastReadAck { ok: true, applied }))
}
