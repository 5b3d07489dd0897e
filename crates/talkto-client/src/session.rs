//! One room's timeline state and the protocol around it: older-page
//! pagination, jump windows, optimistic writes, read flushes and typing.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use talkto_models::api::{HistoryResponse, SearchResponse, SendMessageRequest};
use talkto_models::message::{DeletedMessage, Message, MessageAuthor, ReplySnapshot};
use talkto_models::presence::{TypingPayload, TypingSource};
use talkto_models::room::RoomPolicy;
use talkto_util::validation::{normalize_message_content, search_terms};
use tokio::time::Instant;

use crate::api::ChatApi;
use crate::config::SyncConfig;
use crate::error::ClientError;
use crate::presence::{TypingPresence, TypingThrottle};
use crate::projector::{Projection, ScrollCommand, TimelineProjector};
use crate::read_tracker::{ReadFlush, ReadTracker};
use crate::store::{EventOutcome, MessageStore, SendState};

/// Newest-first history pages fetched at most by one [`RoomSession::resync`].
const RESYNC_MAX_PAGES: usize = 5;

/// What the server handed over when the room was opened.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub slug: Option<String>,
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
    pub last_read_at: Option<DateTime<Utc>>,
    /// Whether `last_read_at` came with the snapshot. When false the session
    /// reads it from the server once.
    pub read_state_included: bool,
}

impl RoomSnapshot {
    pub fn from_history(room_id: impl Into<String>, page: HistoryResponse) -> Self {
        Self {
            room_id: room_id.into(),
            messages: page.messages,
            next_cursor: page.next_cursor,
            ..Self::default()
        }
    }
}

/// An older-page request handed out by [`RoomSession::begin_load_older`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlderRequest {
    pub room_id: String,
    pub cursor: String,
    token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Merged { added: usize, has_more: bool },
    /// A request is already in flight.
    Busy,
    /// Nothing older exists.
    Exhausted,
    /// The fetch failed; `has_more` is untouched and the call can be retried.
    Failed,
    /// The response belonged to another room or a superseded request.
    Discarded,
}

/// A send between its optimistic placeholder and the server's answer.
#[derive(Debug, Clone)]
pub struct OutgoingSend {
    pub placeholder_id: String,
    pub request: SendMessageRequest,
}

pub struct RoomSession {
    api: Arc<dyn ChatApi>,
    config: SyncConfig,
    policy: RoomPolicy,
    store: MessageStore,
    projector: TimelineProjector,
    reader: ReadTracker,
    presence: TypingPresence,
    throttle: TypingThrottle,
    next_cursor: Option<String>,
    loading_older: Option<u64>,
    request_seq: u64,
    new_below: usize,
}

impl RoomSession {
    /// Seeds the session from `snapshot` without touching the network.
    pub fn new(
        api: Arc<dyn ChatApi>,
        local_user: MessageAuthor,
        config: SyncConfig,
        snapshot: RoomSnapshot,
    ) -> Self {
        let RoomSnapshot {
            room_id,
            slug,
            messages,
            next_cursor,
            last_read_at,
            read_state_included,
        } = snapshot;

        let mut store = MessageStore::new(room_id.clone(), local_user.clone());
        store.merge_page(messages);

        let mut reader = ReadTracker::new(room_id, &config);
        if read_state_included {
            reader.hydrate(last_read_at);
        }

        Self {
            api,
            policy: RoomPolicy::for_slug(slug.as_deref()),
            projector: TimelineProjector::new(&config),
            presence: TypingPresence::new(local_user.id, config.typing_ttl()),
            throttle: TypingThrottle::new(config.typing_throttle()),
            config,
            store,
            reader,
            next_cursor,
            loading_older: None,
            request_seq: 0,
            new_below: 0,
        }
    }

    /// Seeds the session and reads the persisted read state if the snapshot
    /// did not carry it.
    pub async fn open(
        api: Arc<dyn ChatApi>,
        local_user: MessageAuthor,
        config: SyncConfig,
        snapshot: RoomSnapshot,
    ) -> Self {
        let mut session = Self::new(api, local_user, config, snapshot);
        session.hydrate_read_state().await;
        session
    }

    /// Projects calendar days in `offset` instead of the process's local offset.
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.projector = TimelineProjector::with_offset(&self.config, offset);
        self
    }

    pub async fn hydrate_read_state(&mut self) -> bool {
        if !self.reader.needs_hydration() {
            return true;
        }
        match self.api.last_read(self.store.room_id()).await {
            Ok(last_read_at) => {
                self.reader.hydrate(last_read_at);
                true
            }
            Err(e) => {
                tracing::warn!(room_id = %self.store.room_id(), "read state fetch failed: {e}");
                false
            }
        }
    }

    pub fn room_id(&self) -> &str {
        self.store.room_id()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local_user(&self) -> &MessageAuthor {
        self.store.local_author()
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older.is_some()
    }

    pub fn last_read_at(&self) -> Option<DateTime<Utc>> {
        self.reader.last_read_at()
    }

    pub fn is_near_bottom(&self) -> bool {
        self.reader.is_near_bottom()
    }

    /// Messages from others that arrived while scrolled away from the bottom.
    pub fn new_below(&self) -> usize {
        self.new_below
    }

    pub fn presence(&self) -> &TypingPresence {
        &self.presence
    }

    /// Current timeline items.
    pub fn projection(&mut self) -> &Projection {
        self.projector
            .project(&self.store, self.reader.last_read_at())
    }

    pub fn scroll_to_bottom(&mut self) -> Option<ScrollCommand> {
        self.projection();
        self.projector.scroll_to_bottom()
    }

    // ── Older pages ─────────────────────────────────────────────────────────

    pub fn begin_load_older(&mut self) -> Result<OlderRequest, LoadOutcome> {
        if self.loading_older.is_some() {
            return Err(LoadOutcome::Busy);
        }
        let Some(cursor) = self.next_cursor.clone() else {
            return Err(LoadOutcome::Exhausted);
        };
        self.request_seq += 1;
        self.loading_older = Some(self.request_seq);
        Ok(OlderRequest {
            room_id: self.store.room_id().to_string(),
            cursor,
            token: self.request_seq,
        })
    }

    pub fn complete_load_older(
        &mut self,
        request: &OlderRequest,
        result: Result<HistoryResponse, ClientError>,
    ) -> LoadOutcome {
        if request.room_id != self.store.room_id() || self.loading_older != Some(request.token) {
            tracing::debug!(
                room_id = %self.store.room_id(),
                request_room = %request.room_id,
                "discarding stale history response"
            );
            return LoadOutcome::Discarded;
        }
        self.loading_older = None;

        match result {
            Ok(page) => {
                let page = self.clamp_page(page);
                let added = self.store.merge_page(page.messages);
                self.next_cursor = page.next_cursor;
                LoadOutcome::Merged {
                    added,
                    has_more: self.next_cursor.is_some(),
                }
            }
            Err(e) => {
                tracing::warn!(room_id = %request.room_id, "history fetch failed: {e}");
                LoadOutcome::Failed
            }
        }
    }

    pub async fn load_older(&mut self) -> LoadOutcome {
        let request = match self.begin_load_older() {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };
        let result = self
            .api
            .history(&request.room_id, Some(&request.cursor))
            .await;
        self.complete_load_older(&request, result)
    }

    /// Catches up on messages missed while the push channel was down.
    ///
    /// Walks newest pages back until one overlaps the cache. The older-page
    /// cursor is only taken over when the cache was empty.
    pub async fn resync(&mut self) -> Result<usize, ClientError> {
        let known_newest = self.newest_confirmed_at();
        let mut cursor: Option<String> = None;
        let mut added = 0;
        let mut caught_up = false;

        for _ in 0..RESYNC_MAX_PAGES {
            let page = self.api.history(self.store.room_id(), cursor.as_deref()).await?;
            let page = self.clamp_page(page);
            let overlaps = match (known_newest, page.messages.first()) {
                (Some(newest), Some(oldest)) => oldest.created_at <= newest,
                _ => true,
            };
            added += self.store.merge_page(page.messages);
            if known_newest.is_none() {
                self.next_cursor = page.next_cursor;
                caught_up = true;
                break;
            }
            match page.next_cursor {
                Some(next) if !overlaps => cursor = Some(next),
                _ => {
                    caught_up = true;
                    break;
                }
            }
        }

        if !caught_up {
            tracing::warn!(
                room_id = %self.store.room_id(),
                added,
                "resync stopped before reaching the cached messages"
            );
        } else {
            tracing::info!(room_id = %self.store.room_id(), added, "timeline resynced");
        }
        Ok(added)
    }

    /// Keeps the newest `page_size` messages of an oversized page. The cursor
    /// moves to the oldest kept message so the next page starts right there.
    fn clamp_page(&self, mut page: HistoryResponse) -> HistoryResponse {
        let limit = self.config.page_size.max(1);
        if page.messages.len() > limit {
            tracing::warn!(
                room_id = %self.store.room_id(),
                len = page.messages.len(),
                limit,
                "trimming oversized history page"
            );
            let excess = page.messages.len() - limit;
            page.messages.drain(..excess);
            page.next_cursor = page.messages.first().map(|m| m.id.clone());
        }
        page
    }

    // ── Jump ────────────────────────────────────────────────────────────────

    /// Scrolls to `message_id`, fetching the window around it when it is
    /// not loaded.
    pub async fn jump_to(&mut self, message_id: &str) -> Result<ScrollCommand, ClientError> {
        if !self.store.contains(message_id) {
            let mut window = self.api.jump(self.store.room_id(), message_id).await?;
            if window.messages.len() > self.config.max_window_len() {
                tracing::warn!(
                    room_id = %self.store.room_id(),
                    len = window.messages.len(),
                    max = self.config.max_window_len(),
                    "trimming oversized jump window"
                );
                if let Some(pos) = window.messages.iter().position(|m| m.id == message_id) {
                    let end = (pos + self.config.window + 1).min(window.messages.len());
                    window.messages.truncate(end);
                    window.messages.drain(..pos.saturating_sub(self.config.window));
                }
            }
            self.store.merge_page(window.messages);
        }

        self.projection();
        self.projector
            .scroll_target(message_id)
            .ok_or_else(|| ClientError::UnknownMessage(message_id.to_string()))
    }

    pub async fn search(
        &self,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<SearchResponse, ClientError> {
        search_terms(query)?;
        self.api.search(self.store.room_id(), query, cursor).await
    }

    // ── Writes ──────────────────────────────────────────────────────────────

    /// Appends the optimistic placeholder and builds the request to send.
    pub fn begin_send(
        &mut self,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<OutgoingSend, ClientError> {
        let content = normalize_message_content(content)?;
        self.policy
            .check_send(content, self.last_own_message_at(), Utc::now())?;

        let reply = reply_to_id
            .and_then(|id| self.store.get(id))
            .map(ReplySnapshot::from);
        self.throttle.stop();
        let pending = self.store.push_placeholder(content, reply, Utc::now());

        Ok(OutgoingSend {
            placeholder_id: pending.placeholder_id,
            request: SendMessageRequest {
                room_id: self.store.room_id().to_string(),
                content: pending.content,
                reply_to_id: reply_to_id.map(str::to_string),
            },
        })
    }

    /// Confirms or rolls back a send. The error carries the server's reason
    /// for [`ClientError::user_message`].
    pub fn complete_send(
        &mut self,
        outgoing: OutgoingSend,
        result: Result<Message, ClientError>,
    ) -> Result<Message, ClientError> {
        match result {
            Ok(message) => {
                self.store
                    .confirm_placeholder(&outgoing.placeholder_id, message.clone());
                self.note_message();
                Ok(message)
            }
            Err(e) => match self.store.rollback(&outgoing.placeholder_id) {
                SendState::Confirmed { message_id } => {
                    tracing::warn!(
                        room_id = %self.store.room_id(),
                        %message_id,
                        "send reported failure after its echo arrived: {e}"
                    );
                    self.store.get(&message_id).cloned().ok_or(e)
                }
                _ => {
                    tracing::warn!(room_id = %self.store.room_id(), "send failed: {e}");
                    Err(e)
                }
            },
        }
    }

    pub async fn send(
        &mut self,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<Message, ClientError> {
        let outgoing = self.begin_send(content, reply_to_id)?;
        let result = self.api.send_message(&outgoing.request).await;
        self.complete_send(outgoing, result)
    }

    /// Edits are not optimistic: on failure the original stays visible.
    pub async fn edit(&mut self, message_id: &str, content: &str) -> Result<Message, ClientError> {
        let content = normalize_message_content(content)?;
        self.policy.check_edit(content)?;
        match self.api.edit_message(message_id, content).await {
            Ok(message) => {
                self.store.apply_edit(message.clone());
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(room_id = %self.store.room_id(), message_id, "edit failed: {e}");
                Err(e)
            }
        }
    }

    /// Tombstones locally right away and restores the message if the server
    /// refuses.
    pub async fn delete(&mut self, message_id: &str) -> Result<(), ClientError> {
        let local = self.store.mark_deleted_locally(message_id, Utc::now());
        match self.api.delete_message(message_id).await {
            Ok(message) => {
                self.store.apply_delete(&DeletedMessage {
                    id: message.id,
                    deleted_at: message.deleted_at,
                });
                Ok(())
            }
            Err(e) => {
                if local {
                    self.store.restore_local_delete(message_id);
                }
                tracing::warn!(room_id = %self.store.room_id(), message_id, "delete failed: {e}");
                Err(e)
            }
        }
    }

    // ── Typing ──────────────────────────────────────────────────────────────

    /// Feeds the composer's text. Returns whether a typing signal went out.
    pub fn on_input_changed(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            self.throttle.stop();
            return false;
        }
        if !self.throttle.should_send(Instant::now()) {
            return false;
        }

        let api = self.api.clone();
        let room_id = self.store.room_id().to_string();
        tokio::spawn(async move {
            if let Err(e) = api.typing(&room_id).await {
                tracing::debug!(%room_id, "typing signal failed: {e}");
            }
        });
        true
    }

    // ── Incoming events ─────────────────────────────────────────────────────

    pub fn receive_message(&mut self, message: Message) -> EventOutcome {
        let author_id = message.author.id.clone();
        let own = author_id == self.store.local_author().id;
        let outcome = self.store.apply_new(message);

        if matches!(outcome, EventOutcome::Inserted | EventOutcome::Reconciled { .. }) {
            self.presence.stop(&author_id);
            if !own && !self.reader.is_near_bottom() {
                self.new_below += 1;
            }
            self.note_message();
        }
        outcome
    }

    pub fn receive_edit(&mut self, message: Message) -> EventOutcome {
        self.store.apply_edit(message)
    }

    pub fn receive_delete(&mut self, payload: &DeletedMessage) -> EventOutcome {
        self.store.apply_delete(payload)
    }

    pub fn receive_typing(
        &mut self,
        payload: &TypingPayload,
        source: TypingSource,
        now: Instant,
    ) -> bool {
        self.presence.on_signal(payload, source, now)
    }

    pub fn sweep_presence(&mut self, now: Instant) -> usize {
        self.presence.sweep(now)
    }

    pub fn typing_summary(&self, now: Instant) -> Option<String> {
        self.presence.summary(now)
    }

    // ── Read state ──────────────────────────────────────────────────────────

    /// Feeds the viewport's distance from the scroll end.
    pub fn on_scroll(&mut self, distance_from_bottom_px: f64) -> Option<ReadFlush> {
        let newest = self.newest_confirmed_at();
        let flush = self.reader.on_scroll(distance_from_bottom_px, newest);
        if self.reader.is_near_bottom() {
            self.new_below = 0;
        }
        self.spawn_flush(flush)
    }

    /// Final read flush. Consumes the session so late responses have nothing
    /// left to write into.
    pub fn leave(mut self) -> Option<ReadFlush> {
        let newest = self.newest_confirmed_at();
        let flush = self.reader.on_leave(newest);
        tracing::debug!(room_id = %self.store.room_id(), "leaving room");
        self.spawn_flush(flush)
    }

    fn note_message(&mut self) -> Option<ReadFlush> {
        let newest = self.newest_confirmed_at();
        let flush = self.reader.on_message(newest);
        self.spawn_flush(flush)
    }

    fn spawn_flush(&self, flush: Option<ReadFlush>) -> Option<ReadFlush> {
        let flush = flush?;
        let api = self.api.clone();
        let request = flush.clone();
        tokio::spawn(async move {
            match api.mark_read(&request.room_id, request.last_read_at).await {
                Ok(ack) if !ack.applied => {
                    tracing::debug!(room_id = %request.room_id, "server read state already ahead");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(room_id = %request.room_id, "read flush failed: {e}");
                }
            }
        });
        Some(flush)
    }

    fn newest_confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.store.newest_confirmed().map(|m| m.created_at)
    }

    fn last_own_message_at(&self) -> Option<DateTime<Utc>> {
        let me = &self.store.local_author().id;
        self.store
            .iter()
            .rev()
            .find(|m| &m.author.id == me)
            .map(|m| m.created_at)
    }
}
