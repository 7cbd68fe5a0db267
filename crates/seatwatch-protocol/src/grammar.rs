//! Ordered grammar for task reports.
//!
//! A task report is whatever follows the task key on an incoming line.
//! Rules are tried in declaration order and the first match wins; a line
//! no rule matches is rejected with [`ProtocolError::Unrecognized`].
//! Every task kind shares the base rules and appends its own after them.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use seatwatch_core::{TaskKind, TaskStatus, WatcherKey};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::parse::{FoundPayload, LostPayload, TrainDetails};

// ============================================================================
// Reports
// ============================================================================

/// A typed task report.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// `<digit>.` or `<digit>-` with an optional JSON error body.
    Attempt {
        status: TaskStatus,
        /// `-` marks an attempt that ended in error.
        errored: bool,
        /// Error body, decoded only for failed statuses. A body that is
        /// not JSON arrives as a string.
        error: Option<Value>,
    },

    /// `-W:<watcher_key>[ dep]`: the server dropped a watcher.
    WatcherRemoved {
        watcher_key: WatcherKey,
        /// The train already departed.
        departed: bool,
    },

    /// `+W:<watcher_key>`: the server tracks a watcher for us.
    WatcherAdded { watcher_key: WatcherKey },

    /// `removed[ <reason>]`: the task was torn down.
    Removed { reason: Option<String> },

    /// `found <json>`
    Found(FoundPayload),

    /// `lost <json>`
    Lost(LostPayload),

    /// `details <json>`
    Details(Box<TrainDetails>),

    /// `vanished <train> <hh:mm>`: the hold on accepted seats expired.
    Vanished {
        train_number: String,
        departure_time: String,
    },

    /// `departed <train> <hh:mm>`: the train left (list tasks).
    Departed {
        train_number: String,
        departure_time: String,
    },
}

impl Report {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Attempt { .. } => "attempt",
            Self::WatcherRemoved { .. } => "watcher_removed",
            Self::WatcherAdded { .. } => "watcher_added",
            Self::Removed { .. } => "removed",
            Self::Found(_) => "found",
            Self::Lost(_) => "lost",
            Self::Details(_) => "details",
            Self::Vanished { .. } => "vanished",
            Self::Departed { .. } => "departed",
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

type Build = fn(&Captures<'_>) -> Result<Report, ProtocolError>;

/// One grammar rule: a pattern and the report it builds.
pub struct Rule {
    name: &'static str,
    pattern: Regex,
    build: Build,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, build: Build) -> Self {
        let pattern = Regex::new(pattern).expect("failed to compile grammar rule");
        Self {
            name,
            pattern,
            build,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Returns capture group `i`, or "" when it did not participate.
fn group<'t>(caps: &Captures<'t>, i: usize) -> &'t str {
    caps.get(i).map_or("", |m| m.as_str())
}

fn json<T: serde::de::DeserializeOwned>(rule: &'static str, body: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(body).map_err(ProtocolError::json(rule))
}

fn build_attempt(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    let digit = group(caps, 1);
    let status = digit
        .parse::<u8>()
        .ok()
        .and_then(TaskStatus::from_code)
        .ok_or_else(|| ProtocolError::UnknownStatus(digit.to_string()))?;

    // A body that is not JSON is kept verbatim; the attempt still counts.
    let error = match caps.get(3) {
        Some(body) if status.is_failed() => Some(
            serde_json::from_str(body.as_str())
                .unwrap_or_else(|_| Value::String(body.as_str().to_string())),
        ),
        _ => None,
    };

    Ok(Report::Attempt {
        status,
        errored: group(caps, 2) == "-",
        error,
    })
}

fn build_watcher_removed(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::WatcherRemoved {
        watcher_key: WatcherKey::new(group(caps, 1)),
        departed: caps.get(2).is_some(),
    })
}

fn build_watcher_added(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::WatcherAdded {
        watcher_key: WatcherKey::new(group(caps, 1)),
    })
}

fn build_removed(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::Removed {
        reason: caps.get(1).map(|m| m.as_str().to_string()),
    })
}

fn build_found(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::Found(json("found", group(caps, 1))?))
}

fn build_lost(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::Lost(json("lost", group(caps, 1))?))
}

fn build_details(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::Details(Box::new(json("details", group(caps, 1))?)))
}

fn build_vanished(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::Vanished {
        train_number: group(caps, 1).to_string(),
        departure_time: group(caps, 2).to_string(),
    })
}

fn build_departed(caps: &Captures<'_>) -> Result<Report, ProtocolError> {
    Ok(Report::Departed {
        train_number: group(caps, 1).to_string(),
        departure_time: group(caps, 2).to_string(),
    })
}

/// Rules every task understands, in match order.
static BASE_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new("attempt", r"^(\d)([.\-])(?:\s(.+))?$", build_attempt),
        Rule::new("watcher_removed", r"^-W:(\S+)(\sdep)?$", build_watcher_removed),
        Rule::new("watcher_added", r"^\+W:(\S+)$", build_watcher_added),
        Rule::new("removed", r"^removed(?:\s(.+))?$", build_removed),
        Rule::new("found", r"^found\s(.+)$", build_found),
        Rule::new("lost", r"^lost\s(.+)$", build_lost),
    ]
});

/// Extra rules for list tasks, tried after the base rules.
static LIST_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new("details", r"^details\s(.+)$", build_details),
        Rule::new("vanished", r"^vanished\s(\S+)\s(\d{2}:\d{2})$", build_vanished),
        Rule::new("departed", r"^departed\s(\S+)\s(\d{2}:\d{2})$", build_departed),
    ]
});

/// Extra rules for details tasks, tried after the base rules.
static DETAILS_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new("details", r"^details\s(.+)$", build_details),
        Rule::new("vanished", r"^vanished\s(\S+)\s(\d{2}:\d{2})$", build_vanished),
    ]
});

// ============================================================================
// Grammar
// ============================================================================

/// The ordered rule list for one task kind.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: Vec<&'static Rule>,
}

impl Grammar {
    /// Composes the base rules with the kind's own rules.
    pub fn for_kind(kind: TaskKind) -> Self {
        let extra: &'static [Rule] = match kind {
            TaskKind::List => &LIST_RULES,
            TaskKind::Details => &DETAILS_RULES,
        };
        Self {
            rules: BASE_RULES.iter().chain(extra.iter()).collect(),
        }
    }

    /// Rule names in match order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Parses a report with the first matching rule.
    ///
    /// A rule that matches but fails to build its report does not fall
    /// through to later rules.
    pub fn parse(&self, body: &str) -> Result<Report, ProtocolError> {
        let body = body.trim();
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(body) {
                return (rule.build)(&caps);
            }
        }
        Err(ProtocolError::Unrecognized(body.to_string()))
    }
}
