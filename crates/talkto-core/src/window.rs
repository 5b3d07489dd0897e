use crate::error::CoreError;
use crate::membership::ensure_participant;
use talkto_db::DbPool;
use talkto_models::message::Message;
use talkto_util::pagination::WINDOW;

#[derive(Debug, Clone)]
pub struct JumpWindow {
    /// Up to `WINDOW` before, the anchor, up to `WINDOW` after. Oldest first.
    pub messages: Vec<Message>,
    pub anchor_id: String,
}

/// Fetches the contiguous neighborhood around `anchor_id`.
pub async fn get_window(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
    anchor_id: &str,
) -> Result<JumpWindow, CoreError> {
    ensure_participant(pool, room_id, user_id).await?;

    let id = anchor_id.trim().parse::<i64>().map_err(|_| CoreError::NotFound)?;
    let anchor = talkto_db::messages::get_room_message(pool, room_id, id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let boundary = anchor.boundary();

    let before =
        talkto_db::messages::get_messages_before(pool, room_id, Some(boundary), WINDOW as i64)
            .await?;
    let after =
        talkto_db::messages::get_messages_after(pool, room_id, boundary, WINDOW as i64).await?;

    let mut messages = Vec::with_capacity(before.len() + after.len() + 1);
    messages.extend(before.into_iter().rev().map(|row| row.into_message()));
    messages.push(anchor.into_message());
    messages.extend(after.into_iter().map(|row| row.into_message()));

    tracing::debug!(room_id, anchor = id, count = messages.len(), "jump window");
    Ok(JumpWindow {
        messages,
        anchor_id: id.to_string(),
    })
}
