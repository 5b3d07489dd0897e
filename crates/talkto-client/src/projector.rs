//! Projection of a [`MessageStore`] into renderable timeline items.
//!
//! Items live in an absolute index space for virtualized lists: loading older
//! messages moves `first_item_index` down instead of renumbering what is
//! already on screen.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};
use talkto_models::message::Message;

use crate::config::SyncConfig;
use crate::store::{MessageStore, SortKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem {
    DaySeparator {
        day: NaiveDate,
    },
    UnreadDivider,
    Message {
        id: String,
        /// Position of the message in the store's sequence.
        store_index: usize,
        grouped_with_previous: bool,
        /// Zero-based position within its author group.
        group_position: usize,
        group_size: usize,
    },
}

impl TimelineItem {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Message { id, .. } => Some(id.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub items: Vec<TimelineItem>,
    /// Absolute index of `items[0]`.
    pub first_item_index: i64,
    /// Message id to absolute index.
    pub index_by_id: HashMap<String, i64>,
}

impl Projection {
    pub fn index_of(&self, id: &str) -> Option<i64> {
        self.index_by_id.get(id).copied()
    }

    pub fn item_at(&self, index: i64) -> Option<&TimelineItem> {
        let offset = usize::try_from(index - self.first_item_index).ok()?;
        self.items.get(offset)
    }

    pub fn last_item_index(&self) -> Option<i64> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.first_item_index + self.items.len() as i64 - 1)
        }
    }

    pub fn unread_divider_index(&self) -> Option<i64> {
        self.items
            .iter()
            .position(|item| matches!(item, TimelineItem::UnreadDivider))
            .map(|pos| self.first_item_index + pos as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAlign {
    Start,
    Center,
    End,
}

/// Instruction for the list view to bring an item into view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollCommand {
    pub index: i64,
    pub align: ScrollAlign,
    pub highlight_id: Option<String>,
    pub highlight_for: Duration,
}

/// Where the last projection stopped, so tail appends can continue from it.
#[derive(Debug, Clone)]
struct BuildMark {
    room_id: String,
    version: u64,
    structural_version: u64,
    last_read_at: Option<DateTime<Utc>>,
    last_key: Option<SortKey>,
    message_count: usize,
    last_day: Option<NaiveDate>,
    divider_placed: bool,
}

#[derive(Debug, Clone)]
pub struct TimelineProjector {
    offset: FixedOffset,
    group_window: chrono::Duration,
    highlight_for: Duration,
    initial_index: i64,
    projection: Projection,
    mark: Option<BuildMark>,
}

impl TimelineProjector {
    /// Projects days in the process's local offset.
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_offset(config, Local::now().offset().fix())
    }

    pub fn with_offset(config: &SyncConfig, offset: FixedOffset) -> Self {
        Self {
            offset,
            group_window: config.group_window(),
            highlight_for: config.highlight(),
            initial_index: config.first_item_index,
            projection: Projection {
                first_item_index: config.first_item_index,
                ..Projection::default()
            },
            mark: None,
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Brings the projection up to date with `store` and `last_read_at`.
    pub fn project(
        &mut self,
        store: &MessageStore,
        last_read_at: Option<DateTime<Utc>>,
    ) -> &Projection {
        let mode = match &self.mark {
            Some(mark) if mark.room_id != store.room_id() => Mode::Reset,
            Some(mark) if mark.last_read_at != last_read_at => Mode::Rebuild,
            Some(mark) if mark.version == store.version() => Mode::Fresh,
            Some(mark) if mark.structural_version == store.structural_version() => Mode::Touch,
            Some(mark) if store.rebuild_version() <= mark.structural_version => Mode::Append,
            Some(_) => Mode::Rebuild,
            None => Mode::Reset,
        };

        match mode {
            Mode::Fresh => {}
            Mode::Touch => {
                if let Some(mark) = self.mark.as_mut() {
                    mark.version = store.version();
                }
            }
            Mode::Append => self.append(store),
            Mode::Rebuild => self.rebuild(store, last_read_at, false),
            Mode::Reset => self.rebuild(store, last_read_at, true),
        }
        &self.projection
    }

    /// Resolves a jump target in the current projection.
    pub fn scroll_target(&self, id: &str) -> Option<ScrollCommand> {
        self.projection.index_of(id).map(|index| ScrollCommand {
            index,
            align: ScrollAlign::Center,
            highlight_id: Some(id.to_string()),
            highlight_for: self.highlight_for,
        })
    }

    /// Scrolls to the newest item without highlighting.
    pub fn scroll_to_bottom(&self) -> Option<ScrollCommand> {
        self.projection.last_item_index().map(|index| ScrollCommand {
            index,
            align: ScrollAlign::End,
            highlight_id: None,
            highlight_for: Duration::ZERO,
        })
    }

    fn day_of(&self, msg: &Message) -> NaiveDate {
        msg.created_at.with_timezone(&self.offset).date_naive()
    }

    fn groups_with(&self, prev: &Message, msg: &Message) -> bool {
        prev.author.id == msg.author.id
            && !prev.is_deleted()
            && !msg.is_deleted()
            && msg.created_at - prev.created_at < self.group_window
    }

    fn rebuild(&mut self, store: &MessageStore, last_read_at: Option<DateTime<Utc>>, reset: bool) {
        let mut items = Vec::with_capacity(store.len() + 8);
        let mut last_day = None;
        let mut divider_placed = false;
        let mut prev: Option<&Message> = None;

        for (store_index, msg) in store.iter().enumerate() {
            let mut breaks = false;
            let day = self.day_of(msg);
            if last_day != Some(day) {
                items.push(TimelineItem::DaySeparator { day });
                last_day = Some(day);
                breaks = true;
            }
            if !divider_placed && last_read_at.is_some_and(|read| msg.created_at > read) {
                items.push(TimelineItem::UnreadDivider);
                divider_placed = true;
                breaks = true;
            }
            let grouped = !breaks && prev.is_some_and(|p| self.groups_with(p, msg));
            items.push(TimelineItem::Message {
                id: msg.id.clone(),
                store_index,
                grouped_with_previous: grouped,
                group_position: 0,
                group_size: 1,
            });
            prev = Some(msg);
        }
        fix_groups(&mut items, 0);

        let first_item_index = if reset {
            self.initial_index
        } else {
            self.anchored_first_index(&items)
        };

        let index_by_id = items
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| {
                item.message_id()
                    .map(|id| (id.to_string(), first_item_index + pos as i64))
            })
            .collect();

        self.projection = Projection {
            items,
            first_item_index,
            index_by_id,
        };
        self.mark = Some(BuildMark {
            room_id: store.room_id().to_string(),
            version: store.version(),
            structural_version: store.structural_version(),
            last_read_at,
            last_key: store.last_key().cloned(),
            message_count: store.len(),
            last_day,
            divider_placed,
        });
    }

    /// Keeps the first message that was already projected at the absolute
    /// index it had. The offset never grows.
    fn anchored_first_index(&self, items: &[TimelineItem]) -> i64 {
        let previous = &self.projection;
        let anchored = items.iter().enumerate().find_map(|(pos, item)| {
            let id = item.message_id()?;
            let old = previous.index_of(id)?;
            Some(old - pos as i64)
        });
        match anchored {
            Some(first) => first.min(previous.first_item_index),
            None => previous.first_item_index,
        }
    }

    fn append(&mut self, store: &MessageStore) {
        let Some(mut mark) = self.mark.take() else {
            self.rebuild(store, None, true);
            return;
        };
        let Some(last_key) = mark.last_key.clone() else {
            let last_read_at = mark.last_read_at;
            self.rebuild(store, last_read_at, false);
            return;
        };

        let items = &mut self.projection.items;
        // the group the old tail belongs to may grow
        let group_start = items
            .iter()
            .rposition(|item| {
                matches!(
                    item,
                    TimelineItem::Message {
                        grouped_with_previous: false,
                        ..
                    }
                )
            })
            .unwrap_or(items.len());

        let mut prev = store.get_by_key(&last_key);
        let mut store_index = mark.message_count;
        let first_new = items.len();
        for (_, msg) in store.after(&last_key) {
            let mut breaks = false;
            let day = msg.created_at.with_timezone(&self.offset).date_naive();
            if mark.last_day != Some(day) {
                items.push(TimelineItem::DaySeparator { day });
                mark.last_day = Some(day);
                breaks = true;
            }
            if !mark.divider_placed && mark.last_read_at.is_some_and(|read| msg.created_at > read) {
                items.push(TimelineItem::UnreadDivider);
                mark.divider_placed = true;
                breaks = true;
            }
            let grouped = !breaks
                && prev.is_some_and(|p| {
                    p.author.id == msg.author.id
                        && !p.is_deleted()
                        && !msg.is_deleted()
                        && msg.created_at - p.created_at < self.group_window
                });
            items.push(TimelineItem::Message {
                id: msg.id.clone(),
                store_index,
                grouped_with_previous: grouped,
                group_position: 0,
                group_size: 1,
            });
            store_index += 1;
            prev = Some(msg);
        }
        fix_groups(items, group_start.min(first_new));

        let first_item_index = self.projection.first_item_index;
        for (pos, item) in self.projection.items.iter().enumerate().skip(first_new) {
            if let Some(id) = item.message_id() {
                self.projection
                    .index_by_id
                    .insert(id.to_string(), first_item_index + pos as i64);
            }
        }

        mark.version = store.version();
        mark.structural_version = store.structural_version();
        mark.last_key = store.last_key().cloned();
        mark.message_count = store.len();
        self.mark = Some(mark);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fresh,
    Touch,
    Append,
    Rebuild,
    Reset,
}

/// Recomputes group position and size for every group starting at or after `from`.
fn fix_groups(items: &mut [TimelineItem], from: usize) {
    let mut group: Vec<usize> = Vec::new();
    for pos in from..items.len() {
        if let TimelineItem::Message {
            grouped_with_previous,
            ..
        } = &items[pos]
        {
            if !*grouped_with_previous {
                close_group(items, &group);
                group.clear();
            }
            group.push(pos);
        }
    }
    close_group(items, &group);
}

fn close_group(items: &mut [TimelineItem], group: &[usize]) {
    let size = group.len();
    for (position, &pos) in group.iter().enumerate() {
        if let TimelineItem::Message {
            group_position,
            group_size,
            ..
        } = &mut items[pos]
        {
            *group_position = position;
            *group_size = size;
        }
    }
}
