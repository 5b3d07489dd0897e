use serde::{Deserialize, Serialize};

/// Wire payload of a `typing` push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: String,
    pub username: Option<String>,
    /// Absent on frames from older servers; read as [`TypingSource::Other`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TypingSource>,
}

/// Where a typing signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingSource {
    /// A member typing at the keyboard.
    User,
    /// An assistant composing on a member's behalf.
    Assistant,
    /// Not stated by the sender.
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_optional_on_the_wire() {
        let bare: TypingPayload = serde_json::from_str(r#"{"userId":"2","username":"bob"}"#).unwrap();
        assert_eq!(bare.source, None);
        assert!(!serde_json::to_string(&bare).unwrap().contains("source"));

        let tagged: TypingPayload =
            serde_json::from_str(r#"{"userId":"2","username":null,"source":"assistant"}"#).unwrap();
        assert_eq!(tagged.source, Some(TypingSource::Assistant));
    }
}
