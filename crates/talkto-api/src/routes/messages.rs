use axum::{
    extract::{Path, State},
    Json,
};
use talkto_core::{parse_id, AppState};
use talkto_models::api::{
    EditMessageRequest, MessageRevision, SendMessageRequest, SendMessageResponse,
};
use talkto_models::message::Message;

use crate::error::ApiError;
use crate::middleware::AuthUser;

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let room_id = parse_id(&body.room_id)?;
    let message = talkto_core::message::send_message(
        &state.db,
        state.config.worker_id,
        room_id,
        auth.user_id,
        &body.content,
        body.reply_to_id.as_deref(),
    )
    .await?;

    let delivered = state
        .event_bus
        .dispatch_new_message(room_id, message.clone());
    tracing::debug!(room_id, message_id = %message.id, delivered, "new-message dispatched");

    Ok(Json(SendMessageResponse { ok: true, message }))
}

pub async fn edit_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let id = parse_id(&message_id)?;
    let outcome =
        talkto_core::message::edit_message(&state.db, id, auth.user_id, &body.content).await?;

    if outcome.changed {
        let room_id = parse_id(&outcome.message.room_id)?;
        state
            .event_bus
            .dispatch_edit_message(room_id, outcome.message.clone());
    }
    Ok(Json(outcome.message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    let id = parse_id(&message_id)?;
    let outcome = talkto_core::message::delete_message(&state.db, id, auth.user_id).await?;

    if outcome.changed {
        let room_id = parse_id(&outcome.message.room_id)?;
        state
            .event_bus
            .dispatch_delete_message(room_id, outcome.deleted_payload());
    }
    Ok(Json(outcome.message))
}

pub async fn message_revisions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<String>,
) -> Result<Json<Vec<MessageRevision>>, ApiError> {
    let id = parse_id(&message_id)?;
    let revisions = talkto_core::message::message_revisions(&state.db, id, auth.user_id).await?;
    Ok(Json(revisions))
}
