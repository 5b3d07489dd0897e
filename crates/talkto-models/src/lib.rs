pub mod api;
pub mod gateway;
pub mod message;
pub mod presence;
pub mod room;
