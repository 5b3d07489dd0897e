//! Room membership and the per-participant read marker.

use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipantRow {
    pub room_id: i64,
    pub user_id: i64,
    pub last_read_at_ms: Option<i64>,
}

pub async fn add_participant(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
    joined_at_ms: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO room_participants (room_id, user_id, joined_at_ms)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (room_id, user_id) DO NOTHING",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(joined_at_ms)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_participant(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
) -> Result<Option<ParticipantRow>, DbError> {
    let row = sqlx::query_as::<_, ParticipantRow>(
        "SELECT room_id, user_id, last_read_at_ms
         FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
    )
    .bind(room_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn is_participant(pool: &DbPool, room_id: i64, user_id: i64) -> Result<bool, DbError> {
    Ok(get_participant(pool, room_id, user_id).await?.is_some())
}

/// Moves the read marker forward. Returns false when the stored value is
/// already at or past `last_read_at_ms`, or the user is not a participant.
pub async fn advance_last_read(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
    last_read_at_ms: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE room_participants SET last_read_at_ms = ?3
         WHERE room_id = ?1 AND user_id = ?2
           AND (last_read_at_ms IS NULL OR last_read_at_ms < ?3)",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(last_read_at_ms)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_room, test_pool};

    #[tokio::test]
    async fn read_marker_never_regresses() {
        let pool = test_pool().await;
        seed_room(&pool).await;

        assert!(advance_last_read(&pool, 10, 1, 2_000).await.unwrap());
        assert!(!advance_last_read(&pool, 10, 1, 1_000).await.unwrap());
        assert!(!advance_last_read(&pool, 10, 1, 2_000).await.unwrap());
        assert!(advance_last_read(&pool, 10, 1, 3_000).await.unwrap());

        let row = get_participant(&pool, 10, 1).await.unwrap().unwrap();
        assert_eq!(row.last_read_at_ms, Some(3_000));
    }

    #[tokio::test]
    async fn non_participant_has_no_marker() {
        let pool = test_pool().await;
        seed_room(&pool).await;
        assert!(!is_participant(&pool, 10, 99).await.unwrap());
        assert!(!advance_last_read(&pool, 10, 99, 5).await.unwrap());
    }

    #[tokio::test]
    async fn joining_twice_is_harmless() {
        let pool = test_pool().await;
        seed_room(&pool).await;
        advance_last_read(&pool, 10, 2, 50).await.unwrap();
        add_participant(&pool, 10, 2, 999).await.unwrap();
        let row = get_participant(&pool, 10, 2).await.unwrap().unwrap();
        assert_eq!(row.last_read_at_ms, Some(50));
    }
}
