use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::CoreError;
use talkto_db::DbPool;
use talkto_models::presence::{TypingPayload, TypingSource};

/// Caps typing broadcasts per user across all rooms and connections.
pub struct TypingLimiter {
    limiter: DefaultKeyedRateLimiter<i64>,
}

impl TypingLimiter {
    pub fn new(per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn allow(&self, user_id: i64) -> bool {
        self.limiter.check_key(&user_id).is_ok()
    }

    /// Drops limiter entries that have fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

/// Resolves a typing signal into the payload to broadcast.
///
/// Returns `None` when nothing should go out: the user is not a participant
/// (typing never auto-joins) or is over the rate limit. A sender can only
/// claim to be typing itself or through an assistant.
pub async fn typing_signal(
    pool: &DbPool,
    limiter: &TypingLimiter,
    room_id: i64,
    user_id: i64,
    source: Option<TypingSource>,
) -> Result<Option<TypingPayload>, CoreError> {
    if !talkto_db::read_states::is_participant(pool, room_id, user_id).await? {
        return Ok(None);
    }
    if !limiter.allow(user_id) {
        tracing::debug!(room_id, user_id, "typing signal rate limited");
        return Ok(None);
    }
    let user = talkto_db::users::get_user(pool, user_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    Ok(Some(TypingPayload {
        user_id: user_id.to_string(),
        username: Some(user.display_name()),
        source: Some(match source {
            Some(TypingSource::Assistant) => TypingSource::Assistant,
            _ => TypingSource::User,
        }),
    }))
}
