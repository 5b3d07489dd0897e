//! Ephemeral typing presence.
//!
//! Nothing here is persisted or replayed: an entry exists only while its TTL
//! runs, and the wire carries no stop event. Time is passed in explicitly so
//! expiry can be driven by a paused tokio clock.

use std::collections::HashMap;
use std::time::Duration;

use talkto_models::presence::{TypingPayload, TypingSource};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEntry {
    pub user_id: String,
    pub username: Option<String>,
    pub source: TypingSource,
    pub expires_at: Instant,
}

impl TypingEntry {
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("user-{}", self.user_id.chars().take(6).collect::<String>()),
        }
    }
}

/// Who is typing in the current room, one entry per user.
#[derive(Debug, Clone)]
pub struct TypingPresence {
    local_user_id: String,
    ttl: Duration,
    entries: HashMap<String, TypingEntry>,
}

impl TypingPresence {
    pub fn new(local_user_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Records or refreshes a signal. The local user's own echoes are ignored.
    pub fn on_signal(&mut self, payload: &TypingPayload, source: TypingSource, now: Instant) -> bool {
        if payload.user_id == self.local_user_id {
            return false;
        }
        self.entries.insert(
            payload.user_id.clone(),
            TypingEntry {
                user_id: payload.user_id.clone(),
                username: payload.username.clone(),
                source,
                expires_at: now + self.ttl,
            },
        );
        true
    }

    /// Drops an entry before its TTL, e.g. when that user's message arrives.
    pub fn stop(&mut self, user_id: &str) -> bool {
        self.entries.remove(user_id).is_some()
    }

    /// Purges expired entries. Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn is_typing(&self, user_id: &str, now: Instant) -> bool {
        self.entries
            .get(user_id)
            .is_some_and(|entry| entry.expires_at > now)
    }

    /// Live entries, ordered by name. Expired entries are absent even
    /// before a sweep removes them.
    pub fn active(&self, now: Instant) -> Vec<&TypingEntry> {
        let mut live: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .collect();
        live.sort_by_key(|entry| entry.display_name().to_lowercase());
        live
    }

    pub fn summary(&self, now: Instant) -> Option<String> {
        let names: Vec<String> = self
            .active(now)
            .into_iter()
            .map(TypingEntry::display_name)
            .collect();
        typing_summary(&names)
    }
}

/// "A is typing…", "A and B are typing…", or "Several people are typing…".
pub fn typing_summary<S: AsRef<str>>(names: &[S]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{} is typing…", one.as_ref())),
        [a, b] => Some(format!("{} and {} are typing…", a.as_ref(), b.as_ref())),
        _ => Some("Several people are typing…".to_string()),
    }
}

/// Limits outbound typing signals to one per interval.
#[derive(Debug, Clone)]
pub struct TypingThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl TypingThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    /// Whether a signal may go out now. Records the send when it may.
    pub fn should_send(&mut self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_sent = Some(now);
                true
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.last_sent.is_some()
    }

    /// Local stop: input emptied or the message was sent. The next keystroke
    /// signals immediately.
    pub fn stop(&mut self) -> bool {
        self.last_sent.take().is_some()
    }
}
