use chrono::{DateTime, Utc};

use crate::config::SyncConfig;

/// A read-state update to post, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFlush {
    pub room_id: String,
    pub last_read_at: DateTime<Utc>,
}

/// Tracks how far the local user has read in one room.
///
/// The local value only moves forward. The server applies the same rule, so a
/// flush that loses a race with a newer one is harmless.
#[derive(Debug, Clone)]
pub struct ReadTracker {
    room_id: String,
    near_bottom_px: f64,
    last_read_at: Option<DateTime<Utc>>,
    hydrated: bool,
    near_bottom: bool,
}

impl ReadTracker {
    pub fn new(room_id: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            room_id: room_id.into(),
            near_bottom_px: config.near_bottom_px,
            last_read_at: None,
            hydrated: false,
            // a freshly opened room starts scrolled to the end
            near_bottom: true,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn last_read_at(&self) -> Option<DateTime<Utc>> {
        self.last_read_at
    }

    pub fn needs_hydration(&self) -> bool {
        !self.hydrated
    }

    /// Seeds the tracker with the persisted value. Only the first call counts.
    pub fn hydrate(&mut self, persisted: Option<DateTime<Utc>>) {
        if self.hydrated {
            return;
        }
        self.hydrated = true;
        self.advance(persisted);
    }

    pub fn is_near_bottom(&self) -> bool {
        self.near_bottom
    }

    /// Feeds the viewport's distance from the scroll end. Reaching the bottom
    /// marks everything loaded as read.
    pub fn on_scroll(
        &mut self,
        distance_from_bottom_px: f64,
        newest: Option<DateTime<Utc>>,
    ) -> Option<ReadFlush> {
        self.set_near_bottom(distance_from_bottom_px <= self.near_bottom_px, newest)
    }

    pub fn set_near_bottom(
        &mut self,
        near_bottom: bool,
        newest: Option<DateTime<Utc>>,
    ) -> Option<ReadFlush> {
        let arrived = near_bottom && !self.near_bottom;
        self.near_bottom = near_bottom;
        if arrived {
            self.flush(newest)
        } else {
            None
        }
    }

    /// A message arrived or was sent; `newest` is the newest loaded message.
    pub fn on_message(&mut self, newest: Option<DateTime<Utc>>) -> Option<ReadFlush> {
        if self.near_bottom {
            self.flush(newest)
        } else {
            None
        }
    }

    /// Final flush when leaving the room while still at the bottom.
    pub fn on_leave(&mut self, newest: Option<DateTime<Utc>>) -> Option<ReadFlush> {
        self.on_message(newest)
    }

    fn flush(&mut self, newest: Option<DateTime<Utc>>) -> Option<ReadFlush> {
        let newest = newest?;
        if !self.advance(Some(newest)) {
            return None;
        }
        Some(ReadFlush {
            room_id: self.room_id.clone(),
            last_read_at: newest,
        })
    }

    fn advance(&mut self, candidate: Option<DateTime<Utc>>) -> bool {
        match (self.last_read_at, candidate) {
            (_, None) => false,
            (Some(current), Some(next)) if next <= current => false,
            (_, Some(next)) => {
                self.last_read_at = Some(next);
                true
            }
        }
    }
}
