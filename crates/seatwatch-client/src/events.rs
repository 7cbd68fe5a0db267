//! Events published to application code.
//!
//! Events are broadcast; a slow subscriber lags and misses events rather
//! than blocking the tracker.

use seatwatch_core::{TaskKey, TaskStatus, Watcher, WatcherKey};
use seatwatch_protocol::TrainDetails;
use serde_json::Value;
use tokio::sync::broadcast;

/// Default broadcast capacity.
pub const EVENT_BUFFER: usize = 256;

/// Higher-level events raised while applying server reports.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// Watchers that just went `Waiting → Succeeded`.
    Found {
        task_key: TaskKey,
        watchers: Vec<Watcher>,
    },

    /// Watchers that went back to `Waiting`.
    Lost {
        task_key: TaskKey,
        watchers: Vec<WatcherKey>,
    },

    /// A task the client did not create was confirmed by the server.
    TaskEmerged { task_key: TaskKey },

    /// Detail payload for one train.
    TrainDetails {
        task_key: TaskKey,
        details: Box<TrainDetails>,
    },

    /// The task entered a failed status.
    Failure {
        task_key: TaskKey,
        status: TaskStatus,
        error: Option<Value>,
    },

    /// A watcher left the task, or its train departed.
    WatcherRemoved {
        task_key: TaskKey,
        watcher_key: WatcherKey,
        departed: bool,
    },

    /// A list task's train left the station.
    Departed {
        task_key: TaskKey,
        train_number: String,
        departure_time: String,
    },

    /// The task was finalized and dropped from the registry.
    TaskRemoved {
        task_key: TaskKey,
        reason: Option<String>,
    },

    /// A new socket was dialed after a close and recovery ran.
    Reconnected,
}

impl TrackerEvent {
    /// The task this event concerns, if any.
    pub fn task_key(&self) -> Option<&TaskKey> {
        match self {
            Self::Found { task_key, .. }
            | Self::Lost { task_key, .. }
            | Self::TaskEmerged { task_key }
            | Self::TrainDetails { task_key, .. }
            | Self::Failure { task_key, .. }
            | Self::WatcherRemoved { task_key, .. }
            | Self::Departed { task_key, .. }
            | Self::TaskRemoved { task_key, .. } => Some(task_key),
            Self::Reconnected => None,
        }
    }
}

/// Cheap-to-clone publisher for [`TrackerEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: TrackerEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUFFER)
    }
}
