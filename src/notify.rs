use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, RankedKind};

const CHANNEL_CAPACITY: usize = 256;

/// What a subscriber listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Schedules,
    Ranked(RankedKind),
}

impl Topic {
    pub fn of(event: &Event) -> Topic {
        match event {
            Event::ScheduleCreated { .. }
            | Event::ScheduleReplaced { .. }
            | Event::ScheduleDeleted { .. } => Topic::Schedules,
            Event::RanksCommitted { kind, .. } => Topic::Ranked(*kind),
        }
    }
}

/// Broadcast hub for committed changes, one channel per topic.
///
/// Downstream notifiers (mail, chat) subscribe here; events are only sent
/// after they are durable in the WAL.
pub struct NotifyHub {
    channels: DashMap<Topic, broadcast::Sender<Event>>,
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

    /// Subscribe to a topic. Creates the channel if needed.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(&Topic::of(event)) {
            let _ = sender.send(event.clone());
        }
    }
}
