//! Per-room message store.
//!
//! Holds one sorted, id-deduplicated sequence of messages and accepts history
//! pages, live push events and optimistic local writes in any order. All merges
//! are idempotent: applying the same page or event twice leaves the store
//! exactly as applying it once.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

use chrono::{DateTime, Duration, Utc};
use talkto_models::gateway::PushEvent;
use talkto_models::message::{
    DeletedMessage, Message, MessageAuthor, ReplySnapshot, DELETED_REPLY_MARKER,
    OPTIMISTIC_ID_PREFIX,
};

/// Secondary sort key for messages sharing a timestamp. Server ids are
/// decimal snowflakes, so a shorter id is the smaller number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdKey(String);

impl Ord for IdKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for IdKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub created_at: DateTime<Utc>,
    pub id: IdKey,
}

impl SortKey {
    pub fn of(msg: &Message) -> Self {
        Self {
            created_at: msg.created_at,
            id: IdKey(msg.id.clone()),
        }
    }
}

/// Lifecycle of an optimistic send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    Pending,
    Confirmed { message_id: String },
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub placeholder_id: String,
    pub room_id: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: SendState,
}

/// What a merge did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Inserted,
    /// The server copy of a local send took the place of its placeholder.
    Reconciled { placeholder_id: String },
    Updated,
    /// Already known, nothing changed.
    Unchanged,
    /// Not for this room, or refers to a message that is not loaded.
    Ignored,
}

impl EventOutcome {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            Self::Inserted | Self::Reconciled { .. } | Self::Updated
        )
    }
}

#[derive(Debug, Clone)]
pub struct MessageStore {
    room_id: String,
    local_author: MessageAuthor,
    entries: BTreeMap<SortKey, Message>,
    keys: HashMap<String, SortKey>,
    /// Sends awaiting their server copy, oldest first.
    pending: Vec<PendingSend>,
    /// Placeholders already replaced by a push echo, keyed to the server id.
    settled: HashMap<String, String>,
    /// Tombstones set locally and not yet confirmed by the server.
    local_deletes: HashSet<String>,
    /// Every named author seen so far, by user id. Never shrinks.
    authors: BTreeMap<String, String>,
    next_local_id: u64,
    version: u64,
    structural_version: u64,
    rebuild_version: u64,
}

impl MessageStore {
    pub fn new(room_id: impl Into<String>, local_author: MessageAuthor) -> Self {
        let mut authors = BTreeMap::new();
        if let Some(name) = named(local_author.username.as_deref()) {
            authors.insert(local_author.id.clone(), name.to_string());
        }
        Self {
            room_id: room_id.into(),
            local_author,
            authors,
            entries: BTreeMap::new(),
            keys: HashMap::new(),
            pending: Vec::new(),
            settled: HashMap::new(),
            local_deletes: HashSet::new(),
            next_local_id: 0,
            version: 0,
            structural_version: 0,
            rebuild_version: 0,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn local_author(&self) -> &MessageAuthor {
        &self.local_author
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages in timeline order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + ExactSizeIterator + '_ {
        self.entries.values()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.keys.get(id).and_then(|key| self.entries.get(key))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    pub fn oldest(&self) -> Option<&Message> {
        self.entries.values().next()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.entries.values().next_back()
    }

    /// Newest message the server knows about; placeholders carry a local clock.
    pub fn newest_confirmed(&self) -> Option<&Message> {
        self.entries.values().rev().find(|m| !m.is_optimistic())
    }

    /// Zero-based position of `id` in timeline order.
    pub fn position(&self, id: &str) -> Option<usize> {
        let key = self.keys.get(id)?;
        Some(self.entries.range(..key.clone()).count())
    }

    /// Bumped on every change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version of the last change to membership, order or tombstones.
    pub fn structural_version(&self) -> u64 {
        self.structural_version
    }

    /// Version of the last structural change that was not a pure tail append.
    pub fn rebuild_version(&self) -> u64 {
        self.rebuild_version
    }

    pub fn pending(&self) -> &[PendingSend] {
        &self.pending
    }

    /// `(user id, username)` of everyone who wrote or was replied to in the
    /// loaded messages, plus the local user. Fed incrementally, so an author
    /// stays known after their messages fall out of view.
    pub fn authors(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.authors
            .iter()
            .map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// Usernames starting with `prefix`, ignoring case, sorted by name.
    pub fn mention_candidates(&self, prefix: &str) -> Vec<&str> {
        let prefix = prefix.trim_start_matches('@').to_lowercase();
        let mut names: Vec<&str> = self
            .authors
            .values()
            .map(String::as_str)
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .collect();
        names.sort_by_key(|name| name.to_lowercase());
        names.dedup();
        names
    }

    pub(crate) fn last_key(&self) -> Option<&SortKey> {
        self.entries.keys().next_back()
    }

    pub(crate) fn get_by_key(&self, key: &SortKey) -> Option<&Message> {
        self.entries.get(key)
    }

    /// Entries strictly after `key`, in order.
    pub(crate) fn after(&self, key: &SortKey) -> impl Iterator<Item = (&SortKey, &Message)> + '_ {
        self.entries
            .range((Bound::Excluded(key.clone()), Bound::Unbounded))
    }

    // ── Page merge ──────────────────────────────────────────────────────────

    /// Unions a history page or jump window into the store. Returns how many
    /// messages were new.
    pub fn merge_page(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        let mut inserted = 0;
        for msg in messages {
            if !self.accepts(&msg) {
                continue;
            }
            if self.keys.contains_key(&msg.id) {
                self.refresh(msg);
            } else {
                self.insert_new(msg);
                inserted += 1;
            }
        }
        inserted
    }

    // ── Live events ─────────────────────────────────────────────────────────

    pub fn apply_event(&mut self, event: PushEvent) -> EventOutcome {
        match event {
            PushEvent::NewMessage(msg) => self.apply_new(msg),
            PushEvent::EditMessage(msg) => self.apply_edit(msg),
            PushEvent::DeleteMessage(payload) => self.apply_delete(&payload),
            PushEvent::Typing(_) => EventOutcome::Ignored,
        }
    }

    pub fn apply_new(&mut self, msg: Message) -> EventOutcome {
        if !self.accepts(&msg) {
            return EventOutcome::Ignored;
        }
        if self.keys.contains_key(&msg.id) {
            return if self.refresh(msg) {
                EventOutcome::Updated
            } else {
                EventOutcome::Unchanged
            };
        }

        if msg.author.id == self.local_author.id {
            if let Some(pos) = self.pending.iter().position(|p| p.content == msg.content) {
                let pending = self.pending.remove(pos);
                self.settled
                    .insert(pending.placeholder_id.clone(), msg.id.clone());
                self.replace_placeholder(&pending.placeholder_id, msg);
                return EventOutcome::Reconciled {
                    placeholder_id: pending.placeholder_id,
                };
            }
        }

        self.insert_new(msg);
        EventOutcome::Inserted
    }

    /// Merges edited fields into a loaded message. Unknown ids are ignored.
    pub fn apply_edit(&mut self, msg: Message) -> EventOutcome {
        if !self.accepts(&msg) {
            return EventOutcome::Ignored;
        }
        let Some(key) = self.keys.get(&msg.id) else {
            return EventOutcome::Ignored;
        };
        let Some(existing) = self.entries.get_mut(key) else {
            return EventOutcome::Ignored;
        };
        if existing.content == msg.content && (existing.is_edited || !msg.is_edited) {
            return EventOutcome::Unchanged;
        }
        existing.content = msg.content;
        existing.is_edited |= msg.is_edited;
        self.bump();
        EventOutcome::Updated
    }

    /// Tombstones a message and masks every loaded reply snapshot pointing at it.
    pub fn apply_delete(&mut self, payload: &DeletedMessage) -> EventOutcome {
        let at = payload.deleted_at.unwrap_or_else(Utc::now);
        let was_local = self.local_deletes.remove(&payload.id);
        let loaded = self.keys.contains_key(&payload.id);

        let mut tombstoned = false;
        let mut retimed = false;
        if let Some(existing) = self
            .keys
            .get(&payload.id)
            .and_then(|key| self.entries.get_mut(key))
        {
            match existing.deleted_at {
                None => {
                    existing.deleted_at = Some(at);
                    tombstoned = true;
                }
                Some(local) if was_local && payload.deleted_at.is_some_and(|t| t != local) => {
                    existing.deleted_at = payload.deleted_at;
                    retimed = true;
                }
                Some(_) => {}
            }
        }

        let rewritten = self.rewrite_replies(&payload.id);
        if tombstoned {
            self.bump_structure(true);
        } else if retimed || rewritten > 0 {
            self.bump();
        }

        if tombstoned || retimed || rewritten > 0 {
            EventOutcome::Updated
        } else if loaded {
            EventOutcome::Unchanged
        } else {
            EventOutcome::Ignored
        }
    }

    // ── Optimistic writes ───────────────────────────────────────────────────

    /// Appends a local placeholder for a send that has not reached the server.
    pub fn push_placeholder(
        &mut self,
        content: &str,
        reply_to: Option<ReplySnapshot>,
        now: DateTime<Utc>,
    ) -> PendingSend {
        self.next_local_id += 1;
        let placeholder_id = format!("{OPTIMISTIC_ID_PREFIX}{}", self.next_local_id);

        // placeholders always land at the tail
        let created_at = match self.newest() {
            Some(newest) if newest.created_at >= now => newest.created_at + Duration::milliseconds(1),
            _ => now,
        };

        let pending = PendingSend {
            placeholder_id: placeholder_id.clone(),
            room_id: self.room_id.clone(),
            content: content.trim().to_string(),
            reply_to_id: reply_to.as_ref().map(|r| r.id.clone()),
            created_at,
            state: SendState::Pending,
        };

        self.insert_new(Message {
            id: placeholder_id,
            room_id: self.room_id.clone(),
            content: pending.content.clone(),
            created_at,
            is_edited: false,
            deleted_at: None,
            author: self.local_author.clone(),
            reply_to,
        });
        self.pending.push(pending.clone());
        pending
    }

    /// Swaps the server copy of a send in for its placeholder.
    pub fn confirm_placeholder(&mut self, placeholder_id: &str, msg: Message) -> SendState {
        let message_id = msg.id.clone();
        if let Some(pos) = self
            .pending
            .iter()
            .position(|p| p.placeholder_id == placeholder_id)
        {
            self.pending.remove(pos);
            self.replace_placeholder(placeholder_id, msg);
        } else {
            // echo arrived first and already took the placeholder's place
            self.settled.remove(placeholder_id);
            if self.keys.contains_key(&msg.id) {
                self.refresh(msg);
            } else if self.accepts(&msg) {
                self.insert_new(msg);
            }
        }
        SendState::Confirmed { message_id }
    }

    /// Removes a failed send's placeholder. A placeholder already replaced by
    /// its push echo stays, since the server did store it.
    pub fn rollback(&mut self, placeholder_id: &str) -> SendState {
        if let Some(message_id) = self.settled.remove(placeholder_id) {
            return SendState::Confirmed { message_id };
        }
        if let Some(pos) = self
            .pending
            .iter()
            .position(|p| p.placeholder_id == placeholder_id)
        {
            self.pending.remove(pos);
            self.remove(placeholder_id);
        }
        SendState::RolledBack
    }

    /// Tombstones a message ahead of the server's confirmation.
    pub fn mark_deleted_locally(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        let Some(existing) = self.keys.get(id).and_then(|key| self.entries.get_mut(key)) else {
            return false;
        };
        if existing.deleted_at.is_some() {
            return false;
        }
        existing.deleted_at = Some(at);
        self.local_deletes.insert(id.to_string());
        self.bump_structure(true);
        true
    }

    /// Undoes [`mark_deleted_locally`](Self::mark_deleted_locally) after the
    /// server refused the delete.
    pub fn restore_local_delete(&mut self, id: &str) -> bool {
        if !self.local_deletes.remove(id) {
            return false;
        }
        let Some(existing) = self.keys.get(id).and_then(|key| self.entries.get_mut(key)) else {
            return false;
        };
        existing.deleted_at = None;
        self.bump_structure(true);
        true
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn accepts(&self, msg: &Message) -> bool {
        if msg.room_id.is_empty() || msg.room_id == self.room_id {
            true
        } else {
            tracing::debug!(
                room_id = %self.room_id,
                message_room = %msg.room_id,
                message_id = %msg.id,
                "dropping message for another room"
            );
            false
        }
    }

    fn note_authors(&mut self, msg: &Message) {
        if let Some(name) = named(msg.author.username.as_deref()) {
            self.authors.insert(msg.author.id.clone(), name.to_string());
        }
        if let Some(reply) = &msg.reply_to {
            if let Some(name) = named(reply.author.username.as_deref()) {
                self.authors
                    .entry(reply.author.id.clone())
                    .or_insert_with(|| name.to_string());
            }
        }
    }

    fn insert_new(&mut self, mut msg: Message) {
        self.note_authors(&msg);
        if let Some(reply) = msg.reply_to.as_mut() {
            if self.get(&reply.id).is_some_and(Message::is_deleted) {
                reply.content = DELETED_REPLY_MARKER.to_string();
            }
        }
        let tombstoned = msg.deleted_at.is_some();
        let id = msg.id.clone();
        let key = SortKey::of(&msg);
        let is_tail = self.last_key().is_none_or(|last| *last < key);

        self.keys.insert(id.clone(), key.clone());
        self.entries.insert(key, msg);
        self.bump_structure(!is_tail);

        if tombstoned && self.rewrite_replies(&id) > 0 {
            self.bump();
        }
    }

    fn remove(&mut self, id: &str) -> Option<Message> {
        let key = self.keys.remove(id)?;
        let msg = self.entries.remove(&key);
        self.bump_structure(true);
        msg
    }

    fn replace_placeholder(&mut self, placeholder_id: &str, msg: Message) {
        self.remove(placeholder_id);
        if self.keys.contains_key(&msg.id) {
            self.refresh(msg);
        } else {
            self.insert_new(msg);
        }
        // ids changed, positions must be recomputed
        self.bump_structure(true);
    }

    /// Refreshes a loaded message from a newer copy. `created_at` never moves
    /// and a tombstone never clears.
    fn refresh(&mut self, incoming: Message) -> bool {
        self.note_authors(&incoming);
        let Some(existing) = self
            .keys
            .get(&incoming.id)
            .and_then(|key| self.entries.get_mut(key))
        else {
            return false;
        };

        let mut changed = false;
        // an unedited copy is older than what we hold once an edit landed
        let stale = existing.is_edited && !incoming.is_edited;
        if !stale && existing.content != incoming.content {
            existing.content = incoming.content;
            changed = true;
        }
        if incoming.is_edited && !existing.is_edited {
            existing.is_edited = true;
            changed = true;
        }
        if existing.author != incoming.author {
            existing.author = incoming.author;
            changed = true;
        }
        if let Some(reply) = incoming.reply_to {
            let masked = existing
                .reply_to
                .as_ref()
                .is_some_and(|r| r.id == reply.id && r.content == DELETED_REPLY_MARKER);
            if !masked && existing.reply_to.as_ref() != Some(&reply) {
                existing.reply_to = Some(reply);
                changed = true;
            }
        }

        let mut tombstoned = false;
        if existing.deleted_at.is_none() && incoming.deleted_at.is_some() {
            existing.deleted_at = incoming.deleted_at;
            tombstoned = true;
        }

        if tombstoned {
            self.local_deletes.remove(&incoming.id);
            self.rewrite_replies(&incoming.id);
            self.bump_structure(true);
        } else if changed {
            self.bump();
        }
        changed || tombstoned
    }

    fn rewrite_replies(&mut self, target_id: &str) -> usize {
        let mut rewritten = 0;
        for msg in self.entries.values_mut() {
            if let Some(reply) = msg.reply_to.as_mut() {
                if reply.id == target_id && reply.content != DELETED_REPLY_MARKER {
                    reply.content = DELETED_REPLY_MARKER.to_string();
                    rewritten += 1;
                }
            }
        }
        rewritten
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    fn bump_structure(&mut self, reorder: bool) {
        self.version += 1;
        self.structural_version = self.version;
        if reorder {
            self.rebuild_version = self.version;
        }
    }
}

fn named(username: Option<&str>) -> Option<&str> {
    username.map(str::trim).filter(|name| !name.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use talkto_models::message::ReplyAuthor;

    pub(crate) fn author(id: &str) -> MessageAuthor {
        MessageAuthor {
            id: id.to_string(),
            username: Some(format!("user{id}")),
            image: None,
            role: None,
        }
    }

    pub(crate) fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub(crate) fn msg(id: &str, secs: i64, author_id: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            room_id: "10".to_string(),
            content: content.to_string(),
            created_at: at(secs),
            is_edited: false,
            deleted_at: None,
            author: author(author_id),
            reply_to: None,
        }
    }

    fn reply(id: &str, secs: i64, parent: &Message) -> Message {
        Message {
            reply_to: Some(ReplySnapshot {
                id: parent.id.clone(),
                content: parent.content.clone(),
                author: ReplyAuthor {
                    id: parent.author.id.clone(),
                    username: parent.author.username.clone(),
                },
            }),
            ..msg(id, secs, "2", "agreed")
        }
    }

    fn ids(store: &MessageStore) -> Vec<String> {
        store.iter().map(|m| m.id.clone()).collect()
    }

    fn assert_sorted(store: &MessageStore) {
        let keys: Vec<_> = store.iter().map(SortKey::of).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "not strictly ascending");
        let unique: HashSet<_> = store.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(unique.len(), store.len());
    }

    #[test]
    fn mixed_inputs_keep_ascending_unique_order() {
        let mut store = MessageStore::new("10", author("1"));
        store.apply_new(msg("105", 50, "2", "live"));
        store.merge_page(vec![msg("101", 10, "1", "a"), msg("102", 20, "2", "b")]);
        store.apply_new(msg("103", 30, "1", "late push"));
        store.merge_page(vec![msg("100", 5, "2", "older"), msg("101", 10, "1", "a")]);
        store.push_placeholder("mine", None, at(40));
        store.apply_new(msg("105", 50, "2", "live"));

        assert_sorted(&store);
        assert_eq!(ids(&store)[..4], ["100", "101", "102", "103"]);
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn equal_timestamps_order_by_numeric_id() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("10", 0, "1", "b"), msg("9", 0, "1", "a")]);
        assert_eq!(ids(&store), ["9", "10"]);
    }

    #[test]
    fn merging_a_page_twice_is_a_no_op() {
        let page = vec![
            msg("101", 10, "1", "a"),
            msg("102", 20, "2", "b"),
            msg("103", 30, "1", "c"),
        ];
        let mut store = MessageStore::new("10", author("1"));
        assert_eq!(store.merge_page(page.clone()), 3);
        let once: Vec<Message> = store.iter().cloned().collect();
        let version = store.version();

        assert_eq!(store.merge_page(page), 0);
        let twice: Vec<Message> = store.iter().cloned().collect();
        assert_eq!(once, twice);
        assert_eq!(store.version(), version);
    }

    #[test]
    fn tombstone_is_sticky_and_created_at_immutable() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("101", 10, "1", "a")]);
        store.apply_delete(&DeletedMessage {
            id: "101".into(),
            deleted_at: Some(at(60)),
        });

        let mut stale = msg("101", 99, "1", "a");
        stale.deleted_at = None;
        store.merge_page(vec![stale]);

        let held = store.get("101").unwrap();
        assert_eq!(held.deleted_at, Some(at(60)));
        assert_eq!(held.created_at, at(10));
    }

    #[test]
    fn stale_page_does_not_undo_a_live_edit() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("101", 10, "1", "draft")]);
        let mut edited = msg("101", 10, "1", "final");
        edited.is_edited = true;
        assert_eq!(store.apply_edit(edited), EventOutcome::Updated);

        store.merge_page(vec![msg("101", 10, "1", "draft")]);
        let held = store.get("101").unwrap();
        assert_eq!(held.content, "final");
        assert!(held.is_edited);
    }

    #[test]
    fn echo_replaces_placeholder_exactly_once() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("101", 10, "2", "hello")]);
        let pending = store.push_placeholder("  hi there ", None, at(20));
        assert_eq!(pending.content, "hi there");
        assert!(store.get(&pending.placeholder_id).unwrap().is_optimistic());

        let echo = msg("102", 21, "1", "hi there");
        assert_eq!(
            store.apply_new(echo.clone()),
            EventOutcome::Reconciled {
                placeholder_id: pending.placeholder_id.clone()
            }
        );
        assert_eq!(ids(&store), ["101", "102"]);

        // the HTTP response lands after the echo
        assert_eq!(
            store.confirm_placeholder(&pending.placeholder_id, echo),
            SendState::Confirmed {
                message_id: "102".into()
            }
        );
        assert_eq!(ids(&store), ["101", "102"]);
        assert!(store.pending().is_empty());
    }

    #[test]
    fn response_before_echo_also_yields_one_message() {
        let mut store = MessageStore::new("10", author("1"));
        let pending = store.push_placeholder("hi", None, at(20));
        let server = msg("102", 21, "1", "hi");

        store.confirm_placeholder(&pending.placeholder_id, server.clone());
        assert_eq!(store.apply_new(server), EventOutcome::Unchanged);
        assert_eq!(ids(&store), ["102"]);
    }

    #[test]
    fn identical_sends_each_keep_their_message() {
        let mut store = MessageStore::new("10", author("1"));
        let first = store.push_placeholder("ok", None, at(20));
        let second = store.push_placeholder("ok", None, at(20));
        assert_ne!(first.placeholder_id, second.placeholder_id);

        store.apply_new(msg("201", 21, "1", "ok"));
        store.confirm_placeholder(&second.placeholder_id, msg("202", 22, "1", "ok"));
        store.confirm_placeholder(&first.placeholder_id, msg("201", 21, "1", "ok"));
        store.apply_new(msg("202", 22, "1", "ok"));

        assert_eq!(ids(&store), ["201", "202"]);
    }

    #[test]
    fn echo_from_someone_else_never_reconciles() {
        let mut store = MessageStore::new("10", author("1"));
        store.push_placeholder("same words", None, at(20));
        assert_eq!(
            store.apply_new(msg("300", 21, "2", "same words")),
            EventOutcome::Inserted
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn rollback_removes_the_placeholder_without_a_tombstone() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("101", 10, "2", "hello")]);
        let pending = store.push_placeholder("doomed", None, at(20));

        assert_eq!(store.rollback(&pending.placeholder_id), SendState::RolledBack);
        assert_eq!(ids(&store), ["101"]);
        assert!(store.pending().is_empty());
    }

    #[test]
    fn placeholder_lands_at_the_tail_when_the_local_clock_lags() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("101", 100, "2", "future")]);
        let pending = store.push_placeholder("now", None, at(50));
        assert_eq!(store.newest().unwrap().id, pending.placeholder_id);
    }

    #[test]
    fn delete_rewrites_reply_snapshots_only() {
        let mut store = MessageStore::new("10", author("1"));
        let parent = msg("101", 10, "1", "original point");
        let child = reply("102", 20, &parent);
        store.merge_page(vec![parent, child]);

        let outcome = store.apply_delete(&DeletedMessage {
            id: "101".into(),
            deleted_at: Some(at(30)),
        });
        assert_eq!(outcome, EventOutcome::Updated);

        assert!(store.get("101").unwrap().is_deleted());
        let child = store.get("102").unwrap();
        assert_eq!(child.content, "agreed");
        let snapshot = child.reply_to.as_ref().unwrap();
        assert_eq!(snapshot.content, DELETED_REPLY_MARKER);
        assert_eq!(snapshot.id, "101");
        assert_eq!(snapshot.author.id, "1");

        // duplicate delivery
        let again = store.apply_delete(&DeletedMessage {
            id: "101".into(),
            deleted_at: Some(at(30)),
        });
        assert_eq!(again, EventOutcome::Unchanged);
    }

    #[test]
    fn reply_loaded_after_parent_delete_is_masked() {
        let mut store = MessageStore::new("10", author("1"));
        let parent = msg("101", 10, "1", "original point");
        let child = reply("102", 20, &parent);
        store.merge_page(vec![parent]);
        store.apply_delete(&DeletedMessage {
            id: "101".into(),
            deleted_at: None,
        });

        store.merge_page(vec![child]);
        let snapshot = store.get("102").unwrap().reply_to.clone().unwrap();
        assert_eq!(snapshot.content, DELETED_REPLY_MARKER);
    }

    #[test]
    fn edits_for_unloaded_messages_are_ignored() {
        let mut store = MessageStore::new("10", author("1"));
        assert_eq!(
            store.apply_edit(msg("999", 10, "1", "ghost")),
            EventOutcome::Ignored
        );
        assert!(store.is_empty());
    }

    #[test]
    fn events_for_other_rooms_are_dropped() {
        let mut store = MessageStore::new("10", author("1"));
        let mut foreign = msg("101", 10, "2", "elsewhere");
        foreign.room_id = "20".into();
        assert_eq!(store.apply_new(foreign), EventOutcome::Ignored);
        assert!(store.is_empty());
    }

    #[test]
    fn local_delete_can_be_restored_until_confirmed() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("101", 10, "1", "oops"), msg("102", 20, "1", "fine")]);

        assert!(store.mark_deleted_locally("101", at(30)));
        assert!(store.get("101").unwrap().is_deleted());
        assert!(store.restore_local_delete("101"));
        assert!(!store.get("101").unwrap().is_deleted());

        store.mark_deleted_locally("102", at(30));
        store.apply_delete(&DeletedMessage {
            id: "102".into(),
            deleted_at: Some(at(31)),
        });
        assert!(!store.restore_local_delete("102"));
        assert_eq!(store.get("102").unwrap().deleted_at, Some(at(31)));
    }

    #[test]
    fn tail_appends_do_not_force_a_rebuild() {
        let mut store = MessageStore::new("10", author("1"));
        store.merge_page(vec![msg("101", 10, "1", "a")]);
        let rebuild = store.rebuild_version();

        store.apply_new(msg("102", 20, "2", "b"));
        assert_eq!(store.rebuild_version(), rebuild);
        assert!(store.structural_version() > rebuild);

        store.merge_page(vec![msg("100", 5, "2", "older")]);
        assert_eq!(store.rebuild_version(), store.version());
    }

    #[test]
    fn authors_roster_collects_writers_and_reply_targets() {
        let mut store = MessageStore::new("10", author("1"));
        assert_eq!(store.authors().collect::<Vec<_>>(), vec![("1", "user1")]);

        let parent = Message {
            author: MessageAuthor {
                id: "7".into(),
                username: Some("Zed".into()),
                image: None,
                role: None,
            },
            ..msg("90", 1, "7", "not loaded")
        };
        store.merge_page(vec![reply("101", 10, &parent)]);
        let mut anonymous = msg("102", 20, "3", "who am i");
        anonymous.author.username = None;
        store.apply_new(anonymous);

        assert_eq!(
            store.authors().collect::<Vec<_>>(),
            vec![("1", "user1"), ("2", "user2"), ("7", "Zed")]
        );

        // a rename on a later copy wins
        let mut renamed = msg("101", 10, "2", "agreed");
        renamed.author.username = Some("bobby".into());
        store.apply_new(renamed);
        assert!(store.authors().any(|(id, name)| id == "2" && name == "bobby"));

        // the roster outlives a rolled back placeholder
        let pending = store.push_placeholder("hello", None, at(30));
        store.rollback(&pending.placeholder_id);
        assert_eq!(store.authors().count(), 3);

        assert_eq!(store.mention_candidates("@z"), vec!["Zed"]);
        assert_eq!(store.mention_candidates("U"), vec!["user1"]);
        assert_eq!(store.mention_candidates(""), vec!["bobby", "user1", "Zed"]);
    }
}
