use chrono::{DateTime, Utc};

use crate::error::CoreError;
use talkto_db::{datetime_from_millis, DbPool};

pub async fn get_last_read(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
) -> Result<Option<DateTime<Utc>>, CoreError> {
    let participant = talkto_db::read_states::get_participant(pool, room_id, user_id)
        .await?
        .ok_or(CoreError::Forbidden)?;
    Ok(participant.last_read_at_ms.map(datetime_from_millis))
}

/// Advances the read marker. Returns whether the stored value moved; an
/// older or equal timestamp is accepted and ignored.
pub async fn mark_read(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
    last_read_at: DateTime<Utc>,
) -> Result<bool, CoreError> {
    if !talkto_db::read_states::is_participant(pool, room_id, user_id).await? {
        return Err(CoreError::Forbidden);
    }
    let applied = talkto_db::read_states::advance_last_read(
        pool,
        room_id,
        user_id,
        last_read_at.timestamp_millis(),
    )
    .await?;
    if !applied {
        tracing::debug!(room_id, user_id, "read marker regression ignored");
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn read_state_is_monotonic() {
        let pool = seeded_pool().await;
        let t = Utc::now();
        assert_eq!(get_last_read(&pool, 10, 1).await.unwrap(), None);

        assert!(mark_read(&pool, 10, 1, t).await.unwrap());
        assert!(!mark_read(&pool, 10, 1, t - Duration::minutes(5)).await.unwrap());
        let stored = get_last_read(&pool, 10, 1).await.unwrap().unwrap();
        assert_eq!(stored.timestamp_millis(), t.timestamp_millis());
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_write() {
        let pool = seeded_pool().await;
        assert!(matches!(
            get_last_read(&pool, 10, 3).await.unwrap_err(),
            CoreError::Forbidden
        ));
        assert!(matches!(
            mark_read(&pool, 10, 3, Utc::now()).await.unwrap_err(),
            CoreError::Forbidden
        ));
    }
}
