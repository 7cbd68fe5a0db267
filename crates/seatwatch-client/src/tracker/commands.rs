//! Commands accepted by the tracker actor.
//!
//! Every command carries a oneshot sender for its reply, so callers can
//! await the outcome without sharing state with the actor.

use seatwatch_core::{TaskIdentity, TaskKey, Watcher, WatcherKey, WatcherSpec};
use tokio::sync::oneshot;

use crate::config::Credentials;
use crate::error::TrackerError;
use crate::task::{Task, TaskOptions};

type Reply<T> = oneshot::Sender<Result<T, TrackerError>>;

// ============================================================================
// Tracker Commands
// ============================================================================

#[derive(Debug)]
pub enum TrackerCommand {
    /// Add a watcher, creating its task on first use.
    ///
    /// # Errors
    /// - `TrackerError::InvalidWatcher` if the task does not accept the watcher
    /// - `TrackerError::TaskStopping` while the task awaits `removed`
    /// - `TrackerError::Connection` if the socket is closed (the watcher is
    ///   kept and replayed after reconnect)
    Track {
        identity: TaskIdentity,
        options: TaskOptions,
        spec: WatcherSpec,
        respond_to: Reply<Watcher>,
    },

    RemoveWatcher {
        task_key: TaskKey,
        watcher_key: WatcherKey,
        respond_to: Reply<()>,
    },

    /// Replies with whether the watcher was restarted.
    RestartWatcher {
        task_key: TaskKey,
        watcher_key: WatcherKey,
        respond_to: Reply<bool>,
    },

    /// Resume a failed task; replies with the number of watchers re-sent.
    RestartTask {
        task_key: TaskKey,
        respond_to: Reply<usize>,
    },

    StopTask {
        task_key: TaskKey,
        respond_to: Reply<()>,
    },

    /// `train` is `(train_number, departure_time)`; details tasks default
    /// to their own train.
    RequestDetails {
        task_key: TaskKey,
        train: Option<(String, String)>,
        respond_to: Reply<()>,
    },

    SetTaskFallback {
        task_key: TaskKey,
        enabled: bool,
        respond_to: Reply<()>,
    },

    SetFallback {
        enabled: bool,
        respond_to: Reply<()>,
    },

    /// Store credentials and log in now if the socket is open.
    Login {
        credentials: Credentials,
        respond_to: oneshot::Sender<()>,
    },

    AliasTask {
        alias: TaskKey,
        target: TaskKey,
        respond_to: Reply<()>,
    },

    GetTask {
        task_key: TaskKey,
        respond_to: oneshot::Sender<Option<Task>>,
    },

    GetAllTasks {
        respond_to: oneshot::Sender<Vec<Task>>,
    },
}
