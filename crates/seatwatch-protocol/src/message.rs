//! Protocol message types for the tracking server session.
//!
//! The protocol is plain text, one message per WebSocket frame, with
//! space-delimited fields.

use std::fmt;

use seatwatch_core::{TaskKey, WatcherKey};

use crate::error::ProtocolError;

/// Handshake banner the server sends right after the socket opens.
pub const BANNER: &str = "open_rzd_api";

// ============================================================================
// Client → Server
// ============================================================================

/// Commands sent by the client.
///
/// `Display` renders the exact wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start (or keep) tracking a watcher. Idempotent on the server.
    Watch {
        task_key: TaskKey,
        watcher_key: WatcherKey,
        /// Server error codes this task tolerates (e.g. `NOT_FOUND`).
        ignore: Vec<String>,
    },

    /// Stop tracking a watcher; confirmed by `-W:<key>`.
    Unwatch {
        task_key: TaskKey,
        watcher_key: WatcherKey,
    },

    /// Tear down a task; confirmed by `removed`.
    Remove { task_key: TaskKey },

    /// Ask for the detail payload of one train.
    GetDetails {
        task_key: TaskKey,
        train_number: String,
        departure_time: String,
    },

    /// Authenticate the session.
    Login {
        identity: String,
        client_name: String,
        checking_code: String,
    },

    /// Toggle the session-wide fallback search strategy.
    Fallback { enabled: bool },

    /// Toggle fallback for one task.
    SetFallbackFor { task_key: TaskKey, enabled: bool },
}

impl Command {
    pub fn watch(task_key: &TaskKey, watcher_key: &WatcherKey, ignore: &[String]) -> Self {
        Self::Watch {
            task_key: task_key.clone(),
            watcher_key: watcher_key.clone(),
            ignore: ignore.to_vec(),
        }
    }

    pub fn unwatch(task_key: &TaskKey, watcher_key: &WatcherKey) -> Self {
        Self::Unwatch {
            task_key: task_key.clone(),
            watcher_key: watcher_key.clone(),
        }
    }

    pub fn remove(task_key: &TaskKey) -> Self {
        Self::Remove {
            task_key: task_key.clone(),
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Watch { .. } => "watch",
            Self::Unwatch { .. } => "unwatch",
            Self::Remove { .. } => "remove",
            Self::GetDetails { .. } => "get_details",
            Self::Login { .. } => "login",
            Self::Fallback { .. } => "fallback",
            Self::SetFallbackFor { .. } => "set_fallback_for",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watch {
                task_key,
                watcher_key,
                ignore,
            } => {
                write!(f, "watch {task_key} {watcher_key}")?;
                if !ignore.is_empty() {
                    write!(f, " ignore:{}", ignore.join(","))?;
                }
                Ok(())
            }
            Self::Unwatch {
                task_key,
                watcher_key,
            } => write!(f, "unwatch {task_key} {watcher_key}"),
            Self::Remove { task_key } => write!(f, "remove {task_key}"),
            Self::GetDetails {
                task_key,
                train_number,
                departure_time,
            } => write!(f, "get_details {task_key} {train_number} {departure_time}"),
            Self::Login {
                identity,
                client_name,
                checking_code,
            } => write!(f, "login {identity} {client_name} {checking_code}"),
            Self::Fallback { enabled } => {
                write!(f, "fallback {}", if *enabled { "enable" } else { "disable" })
            }
            Self::SetFallbackFor { task_key, enabled } => {
                write!(
                    f,
                    "set_fallback_for {task_key} {}",
                    if *enabled { "yes" } else { "no" }
                )
            }
        }
    }
}

// ============================================================================
// Server → Client
// ============================================================================

/// Classification of an incoming line by its prefix.
///
/// Session-level lines are consumed by the connection; everything else is
/// a task report addressed by its leading task key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    /// `login_result success|failure`
    LoginResult { success: bool },

    /// `fallback_enabled yes|no`
    FallbackEnabled { enabled: bool },

    /// `open_rzd_api`
    Banner,

    /// `<task_key> <report...>`
    Task { task_key: TaskKey, body: String },
}

impl SessionMessage {
    /// Classifies a raw line.
    pub fn classify(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let (head, rest) = match line.split_once(' ') {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        match head {
            "" => Err(ProtocolError::MissingTaskKey),
            "login_result" => Ok(Self::LoginResult {
                success: rest == "success",
            }),
            "fallback_enabled" => Ok(Self::FallbackEnabled {
                enabled: rest == "yes",
            }),
            BANNER => Ok(Self::Banner),
            task_key => Ok(Self::Task {
                task_key: TaskKey::new(task_key),
                body: rest.to_string(),
            }),
        }
    }
}
