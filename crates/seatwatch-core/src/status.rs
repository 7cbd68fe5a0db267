//! Task status as reported by the tracking server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a tracking task.
///
/// The numeric codes are the ones the server sends in attempt reports
/// (`0.`, `2-`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Server is polling on the client's behalf.
    #[default]
    InProgress,
    /// Last attempt failed; an explicit restart may resume the task.
    Failure,
    /// Task was stopped and is no longer tracked.
    Stopped,
    /// Task cannot be resumed (e.g. every watched train already departed).
    FatalFailure,
}

impl TaskStatus {
    /// Parses a wire status code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::InProgress),
            2 => Some(Self::Failure),
            4 => Some(Self::Stopped),
            6 => Some(Self::FatalFailure),
            _ => None,
        }
    }

    /// Returns the wire status code.
    pub fn code(&self) -> u8 {
        match self {
            Self::InProgress => 0,
            Self::Failure => 2,
            Self::Stopped => 4,
            Self::FatalFailure => 6,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failure | Self::FatalFailure)
    }

    /// Only a plain failure may be restarted.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Failure)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in progress"),
            Self::Failure => write!(f, "failure"),
            Self::Stopped => write!(f, "stopped"),
            Self::FatalFailure => write!(f, "fatal failure"),
        }
    }
}
