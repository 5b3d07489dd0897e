use crate::{DbError, DbPool};

pub const KIND_EDIT: &str = "EDIT";
pub const KIND_DELETE: &str = "DELETE";

/// Prior content of a message, recorded on every edit and delete.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageHistoryRow {
    pub id: i64,
    pub message_id: i64,
    pub actor_id: i64,
    pub kind: String,
    pub previous_content: String,
    pub created_at_ms: i64,
}

pub async fn get_message_history(
    pool: &DbPool,
    message_id: i64,
) -> Result<Vec<MessageHistoryRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageHistoryRow>(
        "SELECT id, message_id, actor_id, kind, previous_content, created_at_ms
         FROM message_history WHERE message_id = ?1
         ORDER BY created_at_ms ASC, id ASC",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
