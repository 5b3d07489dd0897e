#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use talkto_client::api::ChatApi;
use talkto_client::push::{PushConnection, PushConnector};
use talkto_client::{ClientError, RoomSession, RoomSnapshot, SyncConfig};
use talkto_models::api::{
    HistoryResponse, JumpResponse, LastReadAck, SearchHit, SearchResponse, SendMessageRequest,
};
use talkto_models::gateway::PushEvent;
use talkto_models::message::{Message, MessageAuthor, ReplySnapshot};
use talkto_util::pagination::{PAGE_SIZE, WINDOW};
use tokio::sync::mpsc;

pub const ROOM: &str = "10";
pub const OTHER_ROOM: &str = "20";
pub const FIRST_ID: i64 = 1000;

pub fn me() -> MessageAuthor {
    author("1", "ana")
}

pub fn bob() -> MessageAuthor {
    author("2", "bob")
}

pub fn author(id: &str, username: &str) -> MessageAuthor {
    MessageAuthor {
        id: id.to_string(),
        username: Some(username.to_string()),
        image: None,
        role: Some("USER".to_string()),
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn message(id: i64, at: DateTime<Utc>, author: MessageAuthor, content: &str) -> Message {
    Message {
        id: id.to_string(),
        room_id: ROOM.to_string(),
        content: content.to_string(),
        created_at: at,
        is_edited: false,
        deleted_at: None,
        author,
        reply_to: None,
    }
}

/// `count` messages one minute apart, alternating between bob and the local user.
pub fn seeded(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let who = if i % 2 == 0 { bob() } else { me() };
            message(
                FIRST_ID + i as i64,
                base_time() + Duration::minutes(i as i64),
                who,
                &format!("message {i}"),
            )
        })
        .collect()
}

#[derive(Default)]
struct FakeState {
    messages: Vec<Message>,
    next_id: i64,
    last_read_at: Option<DateTime<Utc>>,
    fail_history: bool,
    fail_send: Option<String>,
    fail_delete: bool,
    history_calls: usize,
    jump_calls: usize,
    read_flushes: Vec<DateTime<Utc>>,
    typing_calls: usize,
}

/// In-memory [`ChatApi`] with the server's paging rules.
pub struct FakeChatApi {
    state: Mutex<FakeState>,
}

impl FakeChatApi {
    pub fn with_messages(messages: Vec<Message>) -> Arc<Self> {
        let next_id = messages
            .iter()
            .filter_map(|m| m.id.parse::<i64>().ok())
            .max()
            .unwrap_or(FIRST_ID)
            + 1;
        Arc::new(Self {
            state: Mutex::new(FakeState {
                messages,
                next_id,
                ..FakeState::default()
            }),
        })
    }

    pub fn newest_page(&self) -> HistoryResponse {
        self.page_before(None)
    }

    /// Stores a message written by someone else, without any push event.
    pub fn publish(&self, message: Message) {
        let mut state = self.state.lock().unwrap();
        if let Ok(id) = message.id.parse::<i64>() {
            state.next_id = state.next_id.max(id + 1);
        }
        state.messages.push(message);
    }

    pub fn set_last_read(&self, at: Option<DateTime<Utc>>) {
        self.state.lock().unwrap().last_read_at = at;
    }

    pub fn fail_history(&self, fail: bool) {
        self.state.lock().unwrap().fail_history = fail;
    }

    pub fn fail_next_send(&self, reason: &str) {
        self.state.lock().unwrap().fail_send = Some(reason.to_string());
    }

    pub fn fail_delete(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete = fail;
    }

    pub fn history_calls(&self) -> usize {
        self.state.lock().unwrap().history_calls
    }

    pub fn jump_calls(&self) -> usize {
        self.state.lock().unwrap().jump_calls
    }

    pub fn read_flushes(&self) -> Vec<DateTime<Utc>> {
        self.state.lock().unwrap().read_flushes.clone()
    }

    pub fn typing_calls(&self) -> usize {
        self.state.lock().unwrap().typing_calls
    }

    pub fn stored(&self, id: &str) -> Option<Message> {
        let state = self.state.lock().unwrap();
        state.messages.iter().find(|m| m.id == id).cloned()
    }

    fn page_before(&self, cursor: Option<usize>) -> HistoryResponse {
        let state = self.state.lock().unwrap();
        let end = cursor.unwrap_or(state.messages.len());
        let start = end.saturating_sub(PAGE_SIZE + 1);
        let mut rows: Vec<Message> = state.messages[start..end].to_vec();
        let has_more = rows.len() > PAGE_SIZE;
        if has_more {
            rows.remove(0);
        }
        HistoryResponse {
            next_cursor: if has_more {
                rows.first().map(|m| m.id.clone())
            } else {
                None
            },
            messages: rows,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        let state = self.state.lock().unwrap();
        state.messages.iter().position(|m| m.id == id)
    }
}

fn api_error(status: u16, code: &str, message: &str) -> ClientError {
    ClientError::Api {
        status,
        code: code.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn history(
        &self,
        _room_id: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryResponse, ClientError> {
        {
            let mut state = self.state.lock().unwrap();
            state.history_calls += 1;
            if state.fail_history {
                return Err(api_error(500, "internal_error", ""));
            }
        }
        let boundary = match cursor {
            Some(id) => Some(
                self.position(id)
                    .ok_or_else(|| api_error(400, "bad_request", "invalid cursor"))?,
            ),
            None => None,
        };
        Ok(self.page_before(boundary))
    }

    async fn jump(&self, _room_id: &str, message_id: &str) -> Result<JumpResponse, ClientError> {
        let pos = self
            .position(message_id)
            .ok_or_else(|| api_error(404, "not_found", "message not found"))?;
        let mut state = self.state.lock().unwrap();
        state.jump_calls += 1;
        let start = pos.saturating_sub(WINDOW);
        let end = (pos + WINDOW + 1).min(state.messages.len());
        Ok(JumpResponse {
            messages: state.messages[start..end].to_vec(),
            anchor_id: message_id.to_string(),
        })
    }

    async fn last_read(&self, _room_id: &str) -> Result<Option<DateTime<Utc>>, ClientError> {
        Ok(self.state.lock().unwrap().last_read_at)
    }

    async fn mark_read(
        &self,
        _room_id: &str,
        last_read_at: DateTime<Utc>,
    ) -> Result<LastReadAck, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.read_flushes.push(last_read_at);
        let applied = state.last_read_at.is_none_or(|current| last_read_at > current);
        if applied {
            state.last_read_at = Some(last_read_at);
        }
        Ok(LastReadAck { ok: true, applied })
    }

    async fn search(
        &self,
        _room_id: &str,
        query: &str,
        _cursor: Option<&str>,
    ) -> Result<SearchResponse, ClientError> {
        let needle = query.to_lowercase();
        let state = self.state.lock().unwrap();
        let results = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.deleted_at.is_none() && m.content.to_lowercase().contains(&needle))
            .map(|m| SearchHit {
                id: m.id.clone(),
                content: m.content.clone(),
                created_at: m.created_at,
                is_edited: m.is_edited,
                deleted_at: None,
                author: m.author.clone(),
                rank: 1.0,
            })
            .collect();
        Ok(SearchResponse {
            results,
            next_cursor: None,
        })
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, ClientError> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_send.take() {
            return Err(api_error(400, "bad_request", &reason));
        }
        let id = state.next_id;
        state.next_id += 1;
        let created_at = state
            .messages
            .last()
            .map(|m| m.created_at + Duration::seconds(1))
            .unwrap_or_else(base_time);
        let reply_to = request
            .reply_to_id
            .as_deref()
            .and_then(|rid| state.messages.iter().find(|m| m.id == rid))
            .map(ReplySnapshot::from);
        let mut msg = message(id, created_at, me(), request.content.trim());
        msg.reply_to = reply_to;
        state.messages.push(msg.clone());
        Ok(msg)
    }

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message, ClientError> {
        let mut state = self.state.lock().unwrap();
        let msg = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| api_error(404, "not_found", "message not found"))?;
        msg.content = content.to_string();
        msg.is_edited = true;
        Ok(msg.clone())
    }

    async fn delete_message(&self, message_id: &str) -> Result<Message, ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(api_error(403, "forbidden", "you can only delete your own messages"));
        }
        let msg = state
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| api_error(404, "not_found", "message not found"))?;
        if msg.deleted_at.is_none() {
            msg.deleted_at = Some(msg.created_at + Duration::hours(1));
        }
        Ok(msg.clone())
    }

    async fn typing(&self, _room_id: &str) -> Result<(), ClientError> {
        self.state.lock().unwrap().typing_calls += 1;
        Ok(())
    }
}

/// [`PushConnector`] whose connections read from in-process channels.
#[derive(Default)]
pub struct ChannelConnector {
    receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<PushEvent>>>,
    connects: Mutex<Vec<String>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl ChannelConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sender feeding the next connection to `room_id`.
    pub fn channel(&self, room_id: &str) -> mpsc::UnboundedSender<PushEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.receivers
            .lock()
            .unwrap()
            .insert(room_id.to_string(), rx);
        tx
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushConnector for ChannelConnector {
    async fn connect(&self, room_id: &str) -> Result<Box<dyn PushConnection>, ClientError> {
        let rx = self
            .receivers
            .lock()
            .unwrap()
            .remove(room_id)
            .ok_or_else(|| api_error(404, "not_found", "no channel for room"))?;
        self.connects.lock().unwrap().push(room_id.to_string());
        Ok(Box::new(ChannelConnection {
            room_id: room_id.to_string(),
            rx,
            closed: self.closed.clone(),
        }))
    }
}

struct ChannelConnection {
    room_id: String,
    rx: mpsc::UnboundedReceiver<PushEvent>,
    closed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PushConnection for ChannelConnection {
    fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn next_event(&mut self) -> Option<Result<PushEvent, ClientError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
        self.closed.lock().unwrap().push(self.room_id.clone());
    }
}

/// A session on the fake's newest page with read state already known.
pub fn open_session(api: &Arc<FakeChatApi>, last_read_at: Option<DateTime<Utc>>) -> RoomSession {
    let mut snapshot = RoomSnapshot::from_history(ROOM, api.newest_page());
    snapshot.last_read_at = last_read_at;
    snapshot.read_state_included = true;
    RoomSession::new(api.clone(), me(), SyncConfig::default(), snapshot)
        .with_utc_offset(chrono::FixedOffset::east_opt(0).unwrap())
}
