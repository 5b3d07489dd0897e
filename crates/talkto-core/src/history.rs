use crate::error::CoreError;
use crate::membership::ensure_participant;
use talkto_db::DbPool;
use talkto_models::message::Message;
use talkto_util::pagination::{split_page, PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct HistoryPage {
    /// Oldest first.
    pub messages: Vec<Message>,
    /// Id of the oldest message returned, present only when older ones exist.
    pub next_cursor: Option<String>,
}

impl HistoryPage {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// One page of messages strictly older than `cursor`, or the newest page.
///
/// A cursor must name a message of the same room; anything else is rejected
/// rather than treated as "no cursor".
pub async fn get_history(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
    cursor: Option<&str>,
) -> Result<HistoryPage, CoreError> {
    ensure_participant(pool, room_id, user_id).await?;

    let boundary = match cursor.map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => {
            let cursor_id = raw.parse::<i64>().map_err(|_| CoreError::InvalidCursor)?;
            let row = talkto_db::messages::get_room_message(pool, room_id, cursor_id)
                .await?
                .ok_or(CoreError::InvalidCursor)?;
            Some(row.boundary())
        }
        None => None,
    };

    let rows = talkto_db::messages::get_messages_before(
        pool,
        room_id,
        boundary,
        (PAGE_SIZE + 1) as i64,
    )
    .await?;

    let page = split_page(rows, PAGE_SIZE);
    let next_cursor = if page.has_more {
        page.items.last().map(|row| row.id.to_string())
    } else {
        None
    };

    let messages = page
        .items
        .into_iter()
        .rev()
        .map(|row| row.into_message())
        .collect();

    Ok(HistoryPage {
        messages,
        next_cursor,
    })
}
