use std::time::Duration;

use serde::{Deserialize, Serialize};
use talkto_util::pagination::{PAGE_SIZE, WINDOW};

/// Distance from the scroll end, in pixels, that still counts as "at the bottom".
pub const NEAR_BOTTOM_PX: f64 = 220.0;
/// Consecutive messages by one author closer than this are grouped.
pub const GROUP_WINDOW_MS: i64 = 4 * 60 * 1000;
pub const TYPING_TTL_MS: u64 = 3_500;
pub const TYPING_SWEEP_MS: u64 = 1_000;
pub const TYPING_THROTTLE_MS: u64 = 1_500;
pub const NOTICE_PREVIEW_CHARS: usize = 80;
pub const HIGHLIGHT_MS: u64 = 1_200;
/// Absolute index of the first projected item before any older page is loaded.
pub const FIRST_ITEM_INDEX: i64 = 1_000_000;

/// Tunables of the timeline engine. Every field has a default, so a partial
/// TOML/JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Most messages kept from one history page; extra older ones are dropped
    /// and fetched again by the next page.
    pub page_size: usize,
    /// Messages kept on each side of a jump anchor.
    pub window: usize,
    pub near_bottom_px: f64,
    pub group_window_ms: i64,
    pub typing_ttl_ms: u64,
    pub typing_sweep_ms: u64,
    pub typing_throttle_ms: u64,
    pub notice_preview_chars: usize,
    pub highlight_ms: u64,
    pub first_item_index: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            window: WINDOW,
            near_bottom_px: NEAR_BOTTOM_PX,
            group_window_ms: GROUP_WINDOW_MS,
            typing_ttl_ms: TYPING_TTL_MS,
            typing_sweep_ms: TYPING_SWEEP_MS,
            typing_throttle_ms: TYPING_THROTTLE_MS,
            notice_preview_chars: NOTICE_PREVIEW_CHARS,
            highlight_ms: HIGHLIGHT_MS,
            first_item_index: FIRST_ITEM_INDEX,
        }
    }
}

impl SyncConfig {
    pub fn group_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.group_window_ms)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn typing_sweep(&self) -> Duration {
        Duration::from_millis(self.typing_sweep_ms.max(1))
    }

    pub fn typing_throttle(&self) -> Duration {
        Duration::from_millis(self.typing_throttle_ms)
    }

    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    /// Largest jump response: the anchor plus `window` on each side.
    pub fn max_window_len(&self) -> usize {
        self.window * 2 + 1
    }
}
