use chrono::{DateTime, Utc};
use thiserror::Error;

pub const SAFE_DEBATE_SLUG: &str = "safe-debate";
pub const SAFE_DEBATE_COOLDOWN_SECONDS: i64 = 15;

/// Per-room posting rules. The server's verdict is final; clients may run the
/// same check for instant feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPolicy {
    Standard,
    SafeDebate { cooldown_secs: i64, forbid_emoji: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("emojis are not allowed in this room")]
    EmojiForbidden,
    #[error("wait {remaining_secs}s before sending another message in this room")]
    Cooldown { remaining_secs: i64 },
}

impl RoomPolicy {
    pub fn for_slug(slug: Option<&str>) -> Self {
        match slug {
            Some(SAFE_DEBATE_SLUG) => Self::SafeDebate {
                cooldown_secs: SAFE_DEBATE_COOLDOWN_SECONDS,
                forbid_emoji: true,
            },
            _ => Self::Standard,
        }
    }

    /// Checks a new message. `last_sent_at` is the author's previous message in the room.
    pub fn check_send(
        &self,
        content: &str,
        last_sent_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyViolation> {
        self.check_edit(content)?;
        if let (Self::SafeDebate { cooldown_secs, .. }, Some(last)) = (self, last_sent_at) {
            let elapsed_ms = (now - last).num_milliseconds();
            let cooldown_ms = cooldown_secs * 1000;
            if elapsed_ms < cooldown_ms {
                let remaining_ms = cooldown_ms - elapsed_ms;
                return Err(PolicyViolation::Cooldown {
                    remaining_secs: (remaining_ms + 999) / 1000,
                });
            }
        }
        Ok(())
    }

    /// Edits are only subject to content rules.
    pub fn check_edit(&self, content: &str) -> Result<(), PolicyViolation> {
        if let Self::SafeDebate { forbid_emoji: true, .. } = self {
            if contains_emoji(content) {
                return Err(PolicyViolation::EmojiForbidden);
            }
        }
        Ok(())
    }
}

/// Coarse pictographic check over the emoji blocks.
pub fn contains_emoji(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c as u32,
            0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2B00..=0x2BFF
            | 0x2300..=0x23FF
            | 0x3030 | 0x303D | 0x3297 | 0x3299
            | 0x00A9 | 0x00AE | 0x203C | 0x2049 | 0x2122 | 0x2139
        )
    })
}
