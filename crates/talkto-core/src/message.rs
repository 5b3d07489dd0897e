use chrono::Utc;

use crate::error::CoreError;
use talkto_db::{datetime_from_millis, DbPool};
use talkto_models::api::MessageRevision;
use talkto_models::message::{DeletedMessage, Message};
use talkto_models::room::RoomPolicy;
use talkto_util::validation::normalize_message_content;

/// Result of an edit or delete. `changed` is false for no-op requests, which
/// must not be broadcast.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub message: Message,
    pub changed: bool,
}

impl MutationOutcome {
    pub fn deleted_payload(&self) -> DeletedMessage {
        DeletedMessage {
            id: self.message.id.clone(),
            deleted_at: self.message.deleted_at,
        }
    }
}

async fn room_policy(pool: &DbPool, room_id: i64) -> Result<RoomPolicy, CoreError> {
    let room = talkto_db::rooms::get_room(pool, room_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    Ok(RoomPolicy::for_slug(room.slug.as_deref()))
}

/// Creates a message. Sending into a room makes the author a participant.
pub async fn send_message(
    pool: &DbPool,
    worker_id: u16,
    room_id: i64,
    author_id: i64,
    content: &str,
    reply_to_id: Option<&str>,
) -> Result<Message, CoreError> {
    let content = normalize_message_content(content)?;
    let policy = room_policy(pool, room_id).await?;

    let parent_id = match reply_to_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(raw) => {
            let invalid = || CoreError::BadRequest("Invalid reply target".into());
            let id = raw.parse::<i64>().map_err(|_| invalid())?;
            talkto_db::messages::get_room_message(pool, room_id, id)
                .await?
                .ok_or_else(invalid)?;
            Some(id)
        }
        None => None,
    };

    let now = Utc::now();
    let last_sent = talkto_db::messages::last_message_at_by_author(pool, room_id, author_id)
        .await?
        .map(datetime_from_millis);
    policy.check_send(content, last_sent, now)?;

    talkto_db::read_states::add_participant(pool, room_id, author_id, now.timestamp_millis())
        .await?;

    let id = talkto_util::snowflake::generate(worker_id);
    let row = talkto_db::messages::create_message(
        pool,
        id,
        room_id,
        author_id,
        content,
        now.timestamp_millis(),
        parent_id,
    )
    .await?;

    tracing::debug!(room_id, message_id = id, author_id, "message created");
    Ok(row.into_message())
}

/// Replaces a message's content. Only the author may edit, and never a
/// deleted message. Identical content is accepted as a no-op.
pub async fn edit_message(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
    content: &str,
) -> Result<MutationOutcome, CoreError> {
    let msg = talkto_db::messages::get_message(pool, message_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if msg.author_id != user_id {
        return Err(CoreError::Forbidden);
    }
    if msg.is_deleted() {
        return Err(CoreError::BadRequest("Cannot edit a deleted message".into()));
    }

    let content = normalize_message_content(content)?;
    if content == msg.content {
        return Ok(MutationOutcome {
            message: msg.into_message(),
            changed: false,
        });
    }

    room_policy(pool, msg.room_id).await?.check_edit(content)?;

    let updated = talkto_db::messages::update_message_content(
        pool,
        message_id,
        user_id,
        content,
        Utc::now().timestamp_millis(),
    )
    .await?;

    Ok(MutationOutcome {
        message: updated.into_message(),
        changed: true,
    })
}

/// Tombstones a message. Only the author may delete; repeating a delete is a
/// no-op that returns the existing tombstone.
pub async fn delete_message(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
) -> Result<MutationOutcome, CoreError> {
    let msg = talkto_db::messages::get_message(pool, message_id)
        .await?
        .ok_or(CoreError::NotFound)?;

    if msg.author_id != user_id {
        return Err(CoreError::Forbidden);
    }
    if msg.is_deleted() {
        return Ok(MutationOutcome {
            message: msg.into_message(),
            changed: false,
        });
    }

    let deleted = talkto_db::messages::soft_delete_message(
        pool,
        message_id,
        user_id,
        Utc::now().timestamp_millis(),
    )
    .await?;

    Ok(MutationOutcome {
        message: deleted.into_message(),
        changed: true,
    })
}

/// Prior versions of a message, oldest first. Visible to its author only.
pub async fn message_revisions(
    pool: &DbPool,
    message_id: i64,
    user_id: i64,
) -> Result<Vec<MessageRevision>, CoreError> {
    let msg = talkto_db::messages::get_message(pool, message_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if msg.author_id != user_id {
        return Err(CoreError::Forbidden);
    }

    let rows = talkto_db::message_history::get_message_history(pool, message_id).await?;
    Ok(rows
        .into_iter()
        .map(|row| MessageRevision {
            kind: row.kind,
            previous_content: row.previous_content,
            actor_id: row.actor_id.to_string(),
            created_at: datetime_from_millis(row.created_at_ms),
        })
        .collect())
}
