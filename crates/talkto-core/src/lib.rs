pub mod auth;
pub mod error;
pub mod events;
pub mod history;
pub mod membership;
pub mod message;
pub mod read_state;
pub mod search;
pub mod typing;
pub mod window;

use std::sync::Arc;

use error::CoreError;
use talkto_db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: events::EventBus,
    pub config: AppConfig,
    /// Per-user limiter for typing broadcasts.
    pub typing_limiter: Arc<typing::TypingLimiter>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            event_bus: events::EventBus::new(config.event_bus_capacity),
            typing_limiter: Arc::new(typing::TypingLimiter::new(config.typing_events_per_minute)),
            config,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    /// Snowflake worker id for message ids.
    pub worker_id: u16,
    pub typing_events_per_minute: u32,
    /// Per-room broadcast buffer. Slow subscribers past this lag skip events.
    pub event_bus_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            worker_id: 1,
            typing_events_per_minute: 120,
            event_bus_capacity: 256,
        }
    }
}

/// Parses a wire id. Every id on the wire is a decimal string.
pub fn parse_id(raw: &str) -> Result<i64, CoreError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| CoreError::BadRequest(format!("invalid id '{raw}'")))
}
