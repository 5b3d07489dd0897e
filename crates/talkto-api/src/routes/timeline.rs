use axum::{
    extract::{Query, State},
    Json,
};
use talkto_core::{parse_id, AppState};
use talkto_models::api::{HistoryResponse, JumpResponse, SearchResponse};
use talkto_util::pagination::{HistoryParams, JumpParams, SearchParams};

use crate::error::ApiError;
use crate::middleware::AuthUser;

pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let room_id = parse_id(&params.room_id)?;
    let page = talkto_core::history::get_history(
        &state.db,
        room_id,
        auth.user_id,
        params.cursor.as_deref(),
    )
    .await?;

    Ok(Json(HistoryResponse {
        messages: page.messages,
        next_cursor: page.next_cursor,
    }))
}

pub async fn jump(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<JumpParams>,
) -> Result<Json<JumpResponse>, ApiError> {
    let room_id = parse_id(&params.room_id)?;
    let window =
        talkto_core::window::get_window(&state.db, room_id, auth.user_id, &params.message_id)
            .await?;

    Ok(Json(JumpResponse {
        messages: window.messages,
        anchor_id: window.anchor_id,
    }))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let room_id = parse_id(&params.room_id)?;
    let results = talkto_core::search::search_room(
        &state.db,
        room_id,
        auth.user_id,
        &params.q,
        params.cursor.as_deref(),
    )
    .await?;
    Ok(Json(results))
}
