use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the request with a `{error, message}` body.
    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("message {0} not found")]
    UnknownMessage(String),

    #[error("{0}")]
    Validation(#[from] talkto_util::validation::ValidationError),

    /// Rejected by the room's posting rules before reaching the server.
    #[error("{0}")]
    Policy(#[from] talkto_models::room::PolicyViolation),

    #[error("no push subscription is active")]
    NotSubscribed,
}

impl ClientError {
    /// Text to show the user: the server's reason when there is one,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::Validation(err) => err.to_string(),
            Self::Policy(violation) => violation.to_string(),
            _ => fallback.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
