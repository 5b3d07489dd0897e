use std::sync::Arc;

use dashmap::DashMap;
use talkto_models::gateway::PushEvent;
use talkto_models::message::{DeletedMessage, Message};
use talkto_models::presence::TypingPayload;
use tokio::sync::broadcast;

/// Room-keyed broadcast bus. Each room gets its own channel on first
/// subscription; publishing to a room nobody listens to is a no-op.
#[derive(Clone)]
pub struct EventBus {
    rooms: Arc<DashMap<i64, broadcast::Sender<Arc<PushEvent>>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, room_id: i64, event: PushEvent) -> usize {
        let Some(sender) = self.rooms.get(&room_id) else {
            return 0;
        };
        // Ignore error if no receivers
        sender.send(Arc::new(event)).unwrap_or(0)
    }

    pub fn subscribe(&self, room_id: i64) -> broadcast::Receiver<Arc<PushEvent>> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops the room's channel once its last subscriber is gone.
    pub fn prune(&self, room_id: i64) {
        self.rooms
            .remove_if(&room_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn dispatch_new_message(&self, room_id: i64, message: Message) -> usize {
        self.publish(room_id, PushEvent::NewMessage(message))
    }

    pub fn dispatch_edit_message(&self, room_id: i64, message: Message) -> usize {
        self.publish(room_id, PushEvent::EditMessage(message))
    }

    pub fn dispatch_delete_message(&self, room_id: i64, deleted: DeletedMessage) -> usize {
        self.publish(room_id, PushEvent::DeleteMessage(deleted))
    }

    pub fn dispatch_typing(&self, room_id: i64, typing: TypingPayload) -> usize {
        self.publish(room_id, PushEvent::Typing(typing))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user: &str) -> TypingPayload {
        TypingPayload {
            user_id: user.into(),
            username: None,
            source: None,
        }
    }

    #[tokio::test]
    async fn events_stay_in_their_room() {
        let bus = EventBus::default();
        let mut a = bus.subscribe(1);
        let mut b = bus.subscribe(2);

        assert_eq!(bus.dispatch_typing(1, typing("7")), 1);
        let got = a.recv().await.unwrap();
        assert_eq!(got.name(), "typing");
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn publishing_to_an_idle_room_is_dropped() {
        let bus = EventBus::default();
        assert_eq!(bus.dispatch_typing(5, typing("1")), 0);
        assert_eq!(bus.active_rooms(), 0);
    }

    #[test]
    fn prune_removes_rooms_without_listeners() {
        let bus = EventBus::default();
        let rx = bus.subscribe(3);
        bus.prune(3);
        assert_eq!(bus.active_rooms(), 1);
        drop(rx);
        bus.prune(3);
        assert_eq!(bus.active_rooms(), 0);
    }
}
