//! Routes push events into the active [`RoomSession`].

use std::sync::Arc;

use talkto_models::gateway::PushEvent;
use talkto_models::message::Message;
use talkto_models::presence::TypingSource;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::ClientError;
use crate::push::{PushConnection, PushConnector};
use crate::session::RoomSession;
use crate::store::EventOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Reply,
    Mention,
}

/// A toast-worthy message from someone else addressed to the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub room_id: String,
    pub message_id: String,
    pub author: String,
    pub preview: String,
}

/// What one step of the dispatcher did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    NewMessage {
        outcome: EventOutcome,
        notice: Option<Notice>,
    },
    EditMessage(EventOutcome),
    DeleteMessage(EventOutcome),
    Typing { accepted: bool },
    /// The presence sweep ran and purged this many entries.
    Swept(usize),
    /// The connection dropped and was reopened; this many missed messages
    /// were merged.
    Resynced(usize),
    /// A frame could not be read; the connection stays up.
    Skipped,
}

struct Subscription {
    connection: Box<dyn PushConnection>,
    sweep: Interval,
}

/// Owns the single push connection of the active room.
pub struct RealtimeDispatcher {
    connector: Arc<dyn PushConnector>,
    subscription: Option<Subscription>,
}

impl RealtimeDispatcher {
    pub fn new(connector: Arc<dyn PushConnector>) -> Self {
        Self {
            connector,
            subscription: None,
        }
    }

    pub fn active_room(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .map(|sub| sub.connection.room_id())
    }

    /// Connects to `session`'s room, closing any connection to another room first.
    pub async fn subscribe(&mut self, session: &RoomSession) -> Result<(), ClientError> {
        if self.active_room() == Some(session.room_id()) {
            return Ok(());
        }
        self.unsubscribe().await;

        let connection = self.connector.connect(session.room_id()).await?;
        let mut sweep = tokio::time::interval(session.config().typing_sweep());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.subscription = Some(Subscription { connection, sweep });
        tracing::debug!(room_id = %session.room_id(), "subscribed to room events");
        Ok(())
    }

    pub async fn unsubscribe(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            let room_id = sub.connection.room_id().to_string();
            sub.connection.close().await;
            tracing::debug!(%room_id, "unsubscribed from room events");
        }
    }

    /// Replaces the connection to the subscribed room and merges what was
    /// missed in between. The subscription is dropped if the room cannot be
    /// reached.
    pub async fn reconnect(&mut self, session: &mut RoomSession) -> Result<usize, ClientError> {
        let sub = self.subscription.as_mut().ok_or(ClientError::NotSubscribed)?;
        if sub.connection.room_id() != session.room_id() {
            return Err(ClientError::NotSubscribed);
        }

        sub.connection.close().await;
        match self.connector.connect(session.room_id()).await {
            Ok(connection) => sub.connection = connection,
            Err(e) => {
                self.subscription = None;
                return Err(e);
            }
        }
        tracing::info!(room_id = %session.room_id(), "push channel reopened");
        session.resync().await
    }

    /// Waits for the next push event or presence sweep and applies it.
    /// A closed connection is reopened once; returns `None` when that fails.
    pub async fn step(&mut self, session: &mut RoomSession) -> Option<Dispatched> {
        let sub = self.subscription.as_mut()?;
        if sub.connection.room_id() != session.room_id() {
            tracing::warn!(
                room_id = %session.room_id(),
                subscribed = %sub.connection.room_id(),
                "session does not match the subscribed room"
            );
            return None;
        }

        enum Wake {
            Event(Option<Result<PushEvent, ClientError>>),
            Sweep,
        }
        let wake = tokio::select! {
            biased;
            event = sub.connection.next_event() => Wake::Event(event),
            _ = sub.sweep.tick() => Wake::Sweep,
        };

        match wake {
            Wake::Sweep => Some(Dispatched::Swept(session.sweep_presence(Instant::now()))),
            Wake::Event(Some(Ok(event))) => Some(route(session, event)),
            Wake::Event(Some(Err(e))) => {
                tracing::warn!(room_id = %session.room_id(), "push channel error: {e}");
                Some(Dispatched::Skipped)
            }
            Wake::Event(None) => {
                tracing::info!(room_id = %session.room_id(), "push channel closed");
                match self.reconnect(session).await {
                    Ok(added) => Some(Dispatched::Resynced(added)),
                    Err(e) if self.subscription.is_some() => {
                        tracing::warn!(room_id = %session.room_id(), "resync after reconnect failed: {e}");
                        Some(Dispatched::Resynced(0))
                    }
                    Err(e) => {
                        tracing::warn!(room_id = %session.room_id(), "push channel reconnect failed: {e}");
                        None
                    }
                }
            }
        }
    }

    /// Drives the session until the connection is lost for good, forwarding
    /// notices.
    pub async fn run(&mut self, session: &mut RoomSession, notices: mpsc::UnboundedSender<Notice>) {
        while let Some(dispatched) = self.step(session).await {
            if let Dispatched::NewMessage {
                notice: Some(notice),
                ..
            } = dispatched
            {
                if notices.send(notice).is_err() {
                    tracing::debug!("notice receiver dropped");
                }
            }
        }
    }
}

/// Applies one event to the session.
pub fn route(session: &mut RoomSession, event: PushEvent) -> Dispatched {
    match event {
        PushEvent::NewMessage(message) => {
            let notice = notice_for(session, &message);
            let outcome = session.receive_message(message);
            let notice = notice.filter(|_| outcome == EventOutcome::Inserted);
            Dispatched::NewMessage { outcome, notice }
        }
        PushEvent::EditMessage(message) => Dispatched::EditMessage(session.receive_edit(message)),
        PushEvent::DeleteMessage(payload) => {
            Dispatched::DeleteMessage(session.receive_delete(&payload))
        }
        PushEvent::Typing(payload) => {
            let source = payload.source.unwrap_or(TypingSource::Other);
            Dispatched::Typing {
                accepted: session.receive_typing(&payload, source, Instant::now()),
            }
        }
    }
}

fn notice_for(session: &RoomSession, message: &Message) -> Option<Notice> {
    let me = session.local_user();
    if message.author.id == me.id {
        return None;
    }

    let is_reply = message
        .reply_to
        .as_ref()
        .is_some_and(|reply| reply.author.id == me.id);
    let kind = if is_reply {
        NoticeKind::Reply
    } else if me
        .username
        .as_deref()
        .is_some_and(|name| mentions(&message.content, name))
    {
        NoticeKind::Mention
    } else {
        return None;
    };

    Some(Notice {
        kind,
        room_id: session.room_id().to_string(),
        message_id: message.id.clone(),
        author: message
            .author
            .username
            .clone()
            .unwrap_or_else(|| "Someone".to_string()),
        preview: preview(&message.content, session.config().notice_preview_chars),
    })
}

/// Whether `content` contains `@username` as a whole word, ignoring case.
pub fn mentions(content: &str, username: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    let needle = format!("@{}", username.to_lowercase());
    let haystack = content.to_lowercase();
    haystack.match_indices(&needle).any(|(start, _)| {
        haystack[start + needle.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_' || c == '-'))
    })
}

/// Shortens `content` to at most `max_chars` characters, ending in "…" when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let content = content.trim();
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let mut out: String = content.chars().take(max_chars.saturating_sub(3)).collect();
    out.push('…');
    out
}
