//! HTTP side of the chat protocol.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use talkto_models::api::{
    EditMessageRequest, ErrorBody, HistoryResponse, JumpResponse, LastReadAck, LastReadResponse,
    LastReadUpdate, SearchResponse, SendMessageRequest, SendMessageResponse, TypingRequest,
};
use talkto_models::message::Message;

use crate::error::ClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Server operations the timeline engine depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn history(
        &self,
        room_id: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryResponse, ClientError>;

    async fn jump(&self, room_id: &str, message_id: &str) -> Result<JumpResponse, ClientError>;

    async fn last_read(&self, room_id: &str) -> Result<Option<DateTime<Utc>>, ClientError>;

    async fn mark_read(
        &self,
        room_id: &str,
        last_read_at: DateTime<Utc>,
    ) -> Result<LastReadAck, ClientError>;

    async fn search(
        &self,
        room_id: &str,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<SearchResponse, ClientError>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError>;

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message, ClientError>;

    async fn delete_message(&self, message_id: &str) -> Result<Message, ClientError>;

    async fn typing(&self, room_id: &str) -> Result<(), ClientError>;
}

/// [`ChatApi`] over the server's JSON routes with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(concat!("talkto-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(err) => (err.error, err.message),
            Err(_) => (
                status.canonical_reason().unwrap_or("error").to_string(),
                String::new(),
            ),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn history(
        &self,
        room_id: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryResponse, ClientError> {
        let mut query = vec![("roomId", room_id)];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        self.execute(self.http.get(self.url("/api/chat/history")).query(&query))
            .await
    }

    async fn jump(&self, room_id: &str, message_id: &str) -> Result<JumpResponse, ClientError> {
        self.execute(
            self.http
                .get(self.url("/api/chat/jump"))
                .query(&[("roomId", room_id), ("messageId", message_id)]),
        )
        .await
    }

    async fn last_read(&self, room_id: &str) -> Result<Option<DateTime<Utc>>, ClientError> {
        let resp: LastReadResponse = self
            .execute(
                self.http
                    .get(self.url("/api/chat/last-read"))
                    .query(&[("roomId", room_id)]),
            )
            .await?;
        Ok(resp.last_read_at)
    }

    async fn mark_read(
        &self,
        room_id: &str,
        last_read_at: DateTime<Utc>,
    ) -> Result<LastReadAck, ClientError> {
        let body = LastReadUpdate {
            room_id: room_id.to_string(),
            last_read_at,
        };
        self.execute(self.http.post(self.url("/api/chat/last-read")).json(&body))
            .await
    }

    async fn search(
        &self,
        room_id: &str,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<SearchResponse, ClientError> {
        let mut params = vec![("roomId", room_id), ("q", query)];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        self.execute(self.http.get(self.url("/api/chat/search")).query(&params))
            .await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError> {
        let resp: SendMessageResponse = self
            .execute(self.http.post(self.url("/api/chat/send")).json(request))
            .await?;
        Ok(resp.message)
    }

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message, ClientError> {
        let body = EditMessageRequest {
            content: content.to_string(),
        };
        self.execute(
            self.http
                .patch(self.url(&format!("/api/chat/messages/{message_id}")))
                .json(&body),
        )
        .await
    }

    async fn delete_message(&self, message_id: &str) -> Result<Message, ClientError> {
        self.execute(
            self.http
                .delete(self.url(&format!("/api/chat/messages/{message_id}"))),
        )
        .await
    }

    async fn typing(&self, room_id: &str) -> Result<(), ClientError> {
        let body = TypingRequest {
            room_id: room_id.to_string(),
            source: None,
        };
        let _: talkto_models::api::OkResponse = self
            .execute(self.http.post(self.url("/api/chat/typing")).json(&body))
            .await?;
        Ok(())
    }
}
