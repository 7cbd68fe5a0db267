//! Error types for the tracking client.
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()` or `todo!()` outside tests.

use seatwatch_core::{KeyError, TaskKey, TaskStatus, WatcherKey};
use seatwatch_protocol::ProtocolError;
use thiserror::Error;

use crate::config::ConfigError;

// ============================================================================
// Connection Errors
// ============================================================================

/// Raised by the connection when a line cannot be sent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    /// No socket, or the socket already closed. Lines are never queued
    /// past a hard close.
    #[error("web socket is closed")]
    Closed,
}

// ============================================================================
// Tracker Errors
// ============================================================================

/// Errors returned by tracker operations.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The watcher is not allowed on this task.
    #[error("invalid watcher for {task_key}: {reason}")]
    InvalidWatcher { task_key: TaskKey, reason: String },

    #[error("task not found: {0}")]
    TaskNotFound(TaskKey),

    /// The task awaits the server's `removed` and takes no new watchers.
    #[error("task {0} is stopping")]
    TaskStopping(TaskKey),

    #[error("watcher {watcher_key} not found in {task_key}")]
    WatcherNotFound {
        task_key: TaskKey,
        watcher_key: WatcherKey,
    },

    /// Only a plain failure can be restarted.
    #[error("task {task_key} is {status} and cannot be restarted")]
    NotRecoverable { task_key: TaskKey, status: TaskStatus },

    /// A list task needs an explicit train for detail requests.
    #[error("task {0} needs a train number and departure time")]
    MissingTrain(TaskKey),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tracker actor is gone.
    #[error("tracker channel closed")]
    ChannelClosed,
}

impl TrackerError {
    pub(crate) fn invalid_watcher(task_key: &TaskKey, reason: impl Into<String>) -> Self {
        Self::InvalidWatcher {
            task_key: task_key.clone(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
