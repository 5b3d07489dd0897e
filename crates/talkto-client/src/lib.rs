//! Client-side timeline synchronization for TalkTo rooms.
//!
//! A [`session::RoomSession`] owns one room's [`store::MessageStore`] and
//! reconciles the initial snapshot, older history pages, jump windows and
//! live push events into a single ordered timeline. The
//! [`projector::TimelineProjector`] turns that store into renderable items
//! with a stable index space, and the [`dispatcher::RealtimeDispatcher`]
//! feeds push events from one per-room connection into the session.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod presence;
pub mod projector;
pub mod push;
pub mod read_tracker;
pub mod session;
pub mod store;

pub use config::SyncConfig;
pub use error::ClientError;
pub use session::{RoomSession, RoomSnapshot};
