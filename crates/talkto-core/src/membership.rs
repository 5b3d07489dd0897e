use crate::error::CoreError;
use talkto_db::DbPool;

/// Fails with `Forbidden` unless the user participates in the room.
pub async fn ensure_participant(pool: &DbPool, room_id: i64, user_id: i64) -> Result<(), CoreError> {
    if talkto_db::read_states::is_participant(pool, room_id, user_id).await? {
        Ok(())
    } else {
        Err(CoreError::Forbidden)
    }
}
