//! Client interface for the tracker actor.
//!
//! `TrackerHandle` is cheap to clone. Every method sends one command and
//! awaits its reply; a stopped actor surfaces as
//! [`TrackerError::ChannelClosed`].

use seatwatch_core::{TaskIdentity, TaskKey, Watcher, WatcherKey, WatcherSpec};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::commands::TrackerCommand;
use crate::config::Credentials;
use crate::connection::SessionState;
use crate::error::{Result, TrackerError};
use crate::events::{EventBus, TrackerEvent};
use crate::task::{Task, TaskOptions};

// ============================================================================
// Tracker Handle
// ============================================================================

#[derive(Clone)]
pub struct TrackerHandle {
    sender: mpsc::Sender<TrackerCommand>,
    bus: EventBus,
    session: watch::Receiver<SessionState>,
}

impl TrackerHandle {
    pub fn new(
        sender: mpsc::Sender<TrackerCommand>,
        bus: EventBus,
        session: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            sender,
            bus,
            session,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> TrackerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| TrackerError::ChannelClosed)?;
        rx.await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Adds a watcher to the task identified by `identity`, creating the
    /// task on first use. `options` only apply to a new task.
    ///
    /// # Errors
    ///
    /// - `TrackerError::InvalidWatcher` if the task rejects the watcher
    /// - `TrackerError::TaskStopping` while the task awaits `removed`
    /// - `TrackerError::Connection` if the socket is closed; the watcher is
    ///   kept and replayed after reconnect
    /// - `TrackerError::ChannelClosed` if the actor has shut down
    pub async fn track(
        &self,
        identity: TaskIdentity,
        options: TaskOptions,
        spec: WatcherSpec,
    ) -> Result<Watcher> {
        self.request(|respond_to| TrackerCommand::Track {
            identity,
            options,
            spec,
            respond_to,
        })
        .await?
    }

    pub async fn remove_watcher(&self, task_key: TaskKey, watcher_key: WatcherKey) -> Result<()> {
        self.request(|respond_to| TrackerCommand::RemoveWatcher {
            task_key,
            watcher_key,
            respond_to,
        })
        .await?
    }

    /// Returns whether the watcher went back to waiting.
    pub async fn restart_watcher(
        &self,
        task_key: TaskKey,
        watcher_key: WatcherKey,
    ) -> Result<bool> {
        self.request(|respond_to| TrackerCommand::RestartWatcher {
            task_key,
            watcher_key,
            respond_to,
        })
        .await?
    }

    /// Resumes a failed task.
    ///
    /// # Errors
    ///
    /// - `TrackerError::NotRecoverable` unless the task is in `Failure`
    pub async fn restart_task(&self, task_key: TaskKey) -> Result<usize> {
        self.request(|respond_to| TrackerCommand::RestartTask {
            task_key,
            respond_to,
        })
        .await?
    }

    /// Stops a task; it is dropped once the server confirms with `removed`.
    pub async fn stop_task(&self, task_key: TaskKey) -> Result<()> {
        self.request(|respond_to| TrackerCommand::StopTask {
            task_key,
            respond_to,
        })
        .await?
    }

    /// Asks for train details. `train` is `(train_number, departure_time)`.
    pub async fn request_details(
        &self,
        task_key: TaskKey,
        train: Option<(String, String)>,
    ) -> Result<()> {
        self.request(|respond_to| TrackerCommand::RequestDetails {
            task_key,
            train,
            respond_to,
        })
        .await?
    }

    pub async fn set_task_fallback(&self, task_key: TaskKey, enabled: bool) -> Result<()> {
        self.request(|respond_to| TrackerCommand::SetTaskFallback {
            task_key,
            enabled,
            respond_to,
        })
        .await?
    }

    /// Toggles fallback search for the whole session.
    pub async fn set_fallback(&self, enabled: bool) -> Result<()> {
        self.request(|respond_to| TrackerCommand::SetFallback {
            enabled,
            respond_to,
        })
        .await?
    }

    /// Stores credentials; they are sent now if the socket is open and on
    /// every reconnect.
    pub async fn login(&self, credentials: Credentials) -> Result<()> {
        self.request(|respond_to| TrackerCommand::Login {
            credentials,
            respond_to,
        })
        .await
    }

    /// Routes server reports addressed to `alias` to `target`.
    pub async fn alias_task(&self, alias: TaskKey, target: TaskKey) -> Result<()> {
        self.request(|respond_to| TrackerCommand::AliasTask {
            alias,
            target,
            respond_to,
        })
        .await?
    }

    /// Snapshot of one task, looked up by its key or an alias.
    pub async fn get_task(&self, task_key: TaskKey) -> Result<Option<Task>> {
        self.request(|respond_to| TrackerCommand::GetTask {
            task_key,
            respond_to,
        })
        .await
    }

    pub async fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.request(|respond_to| TrackerCommand::GetAllTasks { respond_to })
            .await
    }

    /// Subscribe to tracker events.
    ///
    /// Slow subscribers see `RecvError::Lagged` instead of blocking the
    /// tracker.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.bus.subscribe()
    }

    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session.clone()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.borrow().clone()
    }

    /// Returns true while the actor is running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
