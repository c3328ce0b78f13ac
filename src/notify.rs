use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for availability-changed notifications, one channel per
/// facility type. Committed events are the explicit output: subscribers
/// see every mutation that could move a type's availability.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a facility type. Creates the channel if needed.
    pub fn subscribe(&self, type_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(type_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, type_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&type_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a facility type is dropped).
    pub fn remove(&self, type_id: &Ulid) {
        self.channels.remove(type_id);
    }
}
