//! Push channel connections. One connection serves exactly one room and is
//! owned by the [`RealtimeDispatcher`](crate::dispatcher::RealtimeDispatcher).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use talkto_models::gateway::PushEvent;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;

/// Opens push connections.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn PushConnection>, ClientError>;
}

/// A live subscription to one room's events.
#[async_trait]
pub trait PushConnection: Send {
    fn room_id(&self) -> &str;

    /// Next event from the server. `None` once the connection is closed.
    async fn next_event(&mut self) -> Option<Result<PushEvent, ClientError>>;

    async fn close(&mut self);
}

/// Connects to the server's `/gateway` websocket.
#[derive(Debug, Clone)]
pub struct WsPushConnector {
    base_url: String,
    token: String,
}

impl WsPushConnector {
    /// `base_url` is the server root, e.g. `ws://localhost:8080`. An `http`
    /// scheme is rewritten to its websocket counterpart.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base_url
        };
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn gateway_url(&self, room_id: &str) -> Result<String, ClientError> {
        let mut url = Url::parse(&format!("{}/gateway", self.base_url))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.query_pairs_mut()
            .append_pair("roomId", room_id)
            .append_pair("token", &self.token);
        Ok(url.into())
    }
}

#[async_trait]
impl PushConnector for WsPushConnector {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn PushConnection>, ClientError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.gateway_url(room_id)?).await?;
        tracing::info!(room_id, "push channel connected");
        Ok(Box::new(WsPushConnection {
            room_id: room_id.to_string(),
            stream,
        }))
    }
}

pub struct WsPushConnection {
    room_id: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsPushConnection {
    fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn next_event(&mut self) -> Option<Result<PushEvent, ClientError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };
            match frame {
                WsMessage::Text(text) => match serde_json::from_str::<PushEvent>(&text) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => {
                        tracing::warn!(room_id = %self.room_id, "skipping unreadable push frame: {e}");
                    }
                },
                WsMessage::Close(frame) => {
                    tracing::info!(room_id = %self.room_id, ?frame, "push channel closed by server");
                    return None;
                }
                // pings are answered by tungstenite on the next read
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(room_id = %self.room_id, "push channel close failed: {e}");
        }
        if let Err(e) = self.stream.flush().await {
            tracing::debug!(room_id = %self.room_id, "push channel flush failed: {e}");
        }
    }
}
