use serde::{Deserialize, Serialize};

use crate::message::{DeletedMessage, Message};
use crate::presence::TypingPayload;

// Push channel event names
pub const EVENT_NEW_MESSAGE: &str = "new-message";
pub const EVENT_EDIT_MESSAGE: &str = "edit-message";
pub const EVENT_DELETE_MESSAGE: &str = "delete-message";
pub const EVENT_TYPING: &str = "typing";

/// Events delivered on a room's push channel.
///
/// Frames look like `{"event": "new-message", "data": {...}}`. There is no
/// stop-typing event: typing expiry is decided by the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PushEvent {
    NewMessage(Message),
    EditMessage(Message),
    DeleteMessage(DeletedMessage),
    Typing(TypingPayload),
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => EVENT_NEW_MESSAGE,
            Self::EditMessage(_) => EVENT_EDIT_MESSAGE,
            Self::DeleteMessage(_) => EVENT_DELETE_MESSAGE,
            Self::Typing(_) => EVENT_TYPING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_matches_channel_names() {
        let ev = PushEvent::Typing(TypingPayload {
            user_id: "9".into(),
            username: Some("bob".into()),
            source: None,
        });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], EVENT_TYPING);
        assert_eq!(json["data"]["userId"], "9");
        assert_eq!(ev.name(), EVENT_TYPING);
    }

    #[test]
    fn delete_frame_parses() {
        let frame = r#"{"event":"delete-message","data":{"id":"5","deletedAt":"2025-01-02T03:04:05Z"}}"#;
        match serde_json::from_str::<PushEvent>(frame).unwrap() {
            PushEvent::DeleteMessage(d) => {
                assert_eq!(d.id, "5");
                assert!(d.deleted_at.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_rejected() {
        let frame = r#"{"event":"reaction-add","data":{}}"#;
        assert!(serde_json::from_str::<PushEvent>(frame).is_err());
    }
}
