use crate::message_history::{KIND_DELETE, KIND_EDIT};
use crate::{datetime_from_millis, DbError, DbPool};
use talkto_models::message::{
    Message, MessageAuthor, ReplyAuthor, ReplySnapshot, DELETED_REPLY_MARKER,
};

const MESSAGE_SELECT: &str = "SELECT m.id, m.room_id, m.author_id, m.content, m.created_at_ms,
        m.is_edited, m.deleted_at_ms, m.parent_id,
        u.username AS author_username, u.image AS author_image, u.role AS author_role,
        p.content AS parent_content, p.author_id AS parent_author_id,
        pu.username AS parent_author_username, p.deleted_at_ms AS parent_deleted_at_ms
    FROM messages m
    JOIN users u ON u.id = m.author_id
    LEFT JOIN messages p ON p.id = m.parent_id
    LEFT JOIN users pu ON pu.id = p.author_id";

/// A message joined with its author and the message it replies to.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at_ms: i64,
    pub is_edited: bool,
    pub deleted_at_ms: Option<i64>,
    pub parent_id: Option<i64>,
    pub author_username: Option<String>,
    pub author_image: Option<String>,
    pub author_role: Option<String>,
    pub parent_content: Option<String>,
    pub parent_author_id: Option<i64>,
    pub parent_author_username: Option<String>,
    pub parent_deleted_at_ms: Option<i64>,
}

impl MessageRow {
    /// Position in the room timeline. Rows compare by creation time, then id.
    pub fn boundary(&self) -> (i64, i64) {
        (self.created_at_ms, self.id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at_ms.is_some()
    }

    pub fn into_message(self) -> Message {
        let reply_to = match (self.parent_id, self.parent_content, self.parent_author_id) {
            (Some(parent_id), Some(content), Some(author_id)) => Some(ReplySnapshot {
                id: parent_id.to_string(),
                content: if self.parent_deleted_at_ms.is_some() {
                    DELETED_REPLY_MARKER.to_string()
                } else {
                    content
                },
                author: ReplyAuthor {
                    id: author_id.to_string(),
                    username: self.parent_author_username,
                },
            }),
            _ => None,
        };

        Message {
            id: self.id.to_string(),
            room_id: self.room_id.to_string(),
            content: self.content,
            created_at: datetime_from_millis(self.created_at_ms),
            is_edited: self.is_edited,
            deleted_at: self.deleted_at_ms.map(datetime_from_millis),
            author: MessageAuthor {
                id: self.author_id.to_string(),
                username: self.author_username,
                image: self.author_image,
                role: self.author_role,
            },
            reply_to,
        }
    }
}

/// A search candidate with the number of query terms it matched.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchRow {
    #[sqlx(flatten)]
    pub message: MessageRow,
    pub rank: i64,
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Fetches a message only if it belongs to `room_id`.
pub async fn get_room_message(
    pool: &DbPool,
    room_id: i64,
    id: i64,
) -> Result<Option<MessageRow>, DbError> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1 AND m.room_id = ?2");
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id)
        .bind(room_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Newest-first rows strictly older than `before`, or the newest rows when
/// `before` is `None`.
pub async fn get_messages_before(
    pool: &DbPool,
    room_id: i64,
    before: Option<(i64, i64)>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = match before {
        Some((created_at_ms, id)) => {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.room_id = ?1
                   AND (m.created_at_ms < ?2 OR (m.created_at_ms = ?2 AND m.id < ?3))
                 ORDER BY m.created_at_ms DESC, m.id DESC
                 LIMIT ?4"
            );
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(room_id)
                .bind(created_at_ms)
                .bind(id)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.room_id = ?1
                 ORDER BY m.created_at_ms DESC, m.id DESC
                 LIMIT ?2"
            );
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(room_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

/// Oldest-first rows strictly newer than `after`.
pub async fn get_messages_after(
    pool: &DbPool,
    room_id: i64,
    after: (i64, i64),
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let sql = format!(
        "{MESSAGE_SELECT}
         WHERE m.room_id = ?1
           AND (m.created_at_ms > ?2 OR (m.created_at_ms = ?2 AND m.id > ?3))
         ORDER BY m.created_at_ms ASC, m.id ASC
         LIMIT ?4"
    );
    let rows = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(room_id)
        .bind(after.0)
        .bind(after.1)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn create_message(
    pool: &DbPool,
    id: i64,
    room_id: i64,
    author_id: i64,
    content: &str,
    created_at_ms: i64,
    parent_id: Option<i64>,
) -> Result<MessageRow, DbError> {
    sqlx::query(
        "INSERT INTO messages (id, room_id, author_id, content, created_at_ms, parent_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(id)
    .bind(room_id)
    .bind(author_id)
    .bind(content)
    .bind(created_at_ms)
    .bind(parent_id)
    .execute(pool)
    .await?;

    get_message(pool, id).await?.ok_or(DbError::NotFound)
}

/// Replaces the content and records the previous one in `message_history`.
pub async fn update_message_content(
    pool: &DbPool,
    id: i64,
    actor_id: i64,
    content: &str,
    now_ms: i64,
) -> Result<MessageRow, DbError> {
    let mut tx = pool.begin().await?;

    let previous: Option<String> =
        sqlx::query_scalar("SELECT content FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let previous = previous.ok_or(DbError::NotFound)?;

    sqlx::query(
        "INSERT INTO message_history (message_id, actor_id, kind, previous_content, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(id)
    .bind(actor_id)
    .bind(KIND_EDIT)
    .bind(&previous)
    .bind(now_ms)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE messages SET content = ?2, is_edited = 1 WHERE id = ?1")
        .bind(id)
        .bind(content)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    get_message(pool, id).await?.ok_or(DbError::NotFound)
}

/// Tombstones a message. Content is kept; a prior tombstone is left untouched.
pub async fn soft_delete_message(
    pool: &DbPool,
    id: i64,
    actor_id: i64,
    now_ms: i64,
) -> Result<MessageRow, DbError> {
    let mut tx = pool.begin().await?;

    let previous: Option<(String, Option<i64>)> =
        sqlx::query_as("SELECT content, deleted_at_ms FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let (previous, deleted_at_ms) = previous.ok_or(DbError::NotFound)?;

    if deleted_at_ms.is_none() {
        sqlx::query(
            "INSERT INTO message_history (message_id, actor_id, kind, previous_content, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(id)
        .bind(actor_id)
        .bind(KIND_DELETE)
        .bind(&previous)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE messages SET deleted_at_ms = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now_ms)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    get_message(pool, id).await?.ok_or(DbError::NotFound)
}

/// Creation time of the author's latest message in the room.
pub async fn last_message_at_by_author(
    pool: &DbPool,
    room_id: i64,
    author_id: i64,
) -> Result<Option<i64>, DbError> {
    let value: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(created_at_ms) FROM messages WHERE room_id = ?1 AND author_id = ?2",
    )
    .bind(room_id)
    .bind(author_id)
    .fetch_one(pool)
    .await?;
    Ok(value)
}

/// Messages matching at least one of `terms` (already lowercased), best
/// match first, then newest first. `after` is the `(rank, created_at_ms, id)`
/// of the last row already returned; only rows sorting after it come back.
pub async fn search_messages(
    pool: &DbPool,
    room_id: i64,
    terms: &[String],
    after: Option<(i64, i64, i64)>,
    limit: i64,
) -> Result<Vec<SearchRow>, DbError> {
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    // Placeholders ?1..?5 are fixed; terms start at ?6.
    let rank_expr = (0..terms.len())
        .map(|i| format!("(CASE WHEN instr(lower(q.content), ?{}) > 0 THEN 1 ELSE 0 END)", i + 6))
        .collect::<Vec<_>>()
        .join(" + ");
    let sql = format!(
        "SELECT * FROM (
            SELECT q.*, ({rank_expr}) AS rank FROM ({MESSAGE_SELECT}) AS q
            WHERE q.room_id = ?1
              AND q.deleted_at_ms IS NULL
         )
         WHERE rank > 0
           AND (?2 IS NULL
                OR rank < ?2
                OR (rank = ?2 AND (created_at_ms < ?3
                                   OR (created_at_ms = ?3 AND id < ?4))))
         ORDER BY rank DESC, created_at_ms DESC, id DESC
         LIMIT ?5"
    );

    let mut query = sqlx::query_as::<_, SearchRow>(&sql)
        .bind(room_id)
        .bind(after.map(|(rank, _, _)| rank))
        .bind(after.map(|(_, created_at_ms, _)| created_at_ms))
        .bind(after.map(|(_, _, id)| id))
        .bind(limit);
    for term in terms {
        query = query.bind(term);
    }
    Ok(query.fetch_all(pool).await?)
}
