use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix for ids of messages that exist only locally, awaiting server confirmation.
pub const OPTIMISTIC_ID_PREFIX: &str = "optimistic-";

/// Content shown in a reply snapshot once the referenced message is deleted.
pub const DELETED_REPLY_MARKER: &str = "Message deleted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub room_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub author: MessageAuthor,
    #[serde(default)]
    pub reply_to: Option<ReplySnapshot>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_optimistic(&self) -> bool {
        self.id.starts_with(OPTIMISTIC_ID_PREFIX)
    }
}

/// Denormalized author summary carried on every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAuthor {
    pub id: String,
    pub username: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Snapshot of the replied-to message taken at reply time. Not a live view:
/// only a delete rewrites it, to [`DELETED_REPLY_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub id: String,
    pub content: String,
    pub author: ReplyAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyAuthor {
    pub id: String,
    pub username: Option<String>,
}

impl From<&Message> for ReplySnapshot {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            content: if msg.is_deleted() {
                DELETED_REPLY_MARKER.to_string()
            } else {
                msg.content.clone()
            },
            author: ReplyAuthor {
                id: msg.author.id.clone(),
                username: msg.author.username.clone(),
            },
        }
    }
}

/// Payload of a `delete-message` push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessage {
    pub id: String,
    pub deleted_at: Option<DateTime<Utc>>,
}
