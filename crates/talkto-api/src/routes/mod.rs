pub mod messages;
pub mod read_state;
pub mod timeline;
pub mod typing;
