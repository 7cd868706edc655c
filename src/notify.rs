use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-interviewer change notifications. Sweepers and
/// API watchers subscribe by interviewer id.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for an interviewer. Creates the channel if needed.
    pub fn subscribe(&self, interviewer_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(interviewer_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, interviewer_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&interviewer_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel once its interviewer is gone.
    #[allow(dead_code)]
    pub fn remove(&self, interviewer_id: &Ulid) {
        self.channels.remove(interviewer_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}
