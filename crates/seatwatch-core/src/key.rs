//! Canonical keys for tasks and watchers.
//!
//! Keys double as wire-protocol addresses, so the encoding must be
//! byte-for-byte stable: fields are emitted in declaration order (never
//! sorted) and decoding is the exact inverse of encoding.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, KeyResult};

// ============================================================================
// Field Map Codec
// ============================================================================

/// Joins `field=value` pairs with `&` in the order given.
///
/// Field names are always percent-encoded. Values are percent-encoded
/// unless `skip_uri_escape` is set. With `skip_empty`, pairs whose value
/// is empty are left out entirely (no dangling `field=`).
///
/// ```
/// use seatwatch_core::encode;
///
/// assert_eq!(encode(&[("a", "1"), ("b", "M&Ms")], false, false), "a=1&b=M%26Ms");
/// assert_eq!(encode(&[("a", "1"), ("b", ""), ("c", "3")], false, true), "a=1&c=3");
/// ```
pub fn encode<K, V>(fields: &[(K, V)], skip_uri_escape: bool, skip_empty: bool) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fields
        .iter()
        .filter(|(_, value)| !skip_empty || !value.as_ref().is_empty())
        .map(|(field, value)| {
            let value = value.as_ref();
            let value: Cow<'_, str> = if skip_uri_escape {
                Cow::Borrowed(value)
            } else {
                urlencoding::encode(value)
            };
            format!("{}={}", urlencoding::encode(field.as_ref()), value)
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Splits a key produced by [`encode`] back into ordered pairs.
///
/// Every `&`-separated segment must contain exactly one `=`. The empty
/// string decodes to an empty list.
pub fn decode(key: &str, skip_uri_unescape: bool) -> KeyResult<Vec<(String, String)>> {
    if key.is_empty() {
        return Ok(Vec::new());
    }

    key.split('&')
        .map(|segment| {
            let mut parts = segment.split('=');
            let (field, value) = match (parts.next(), parts.next(), parts.next()) {
                (Some(field), Some(value), None) => (field, value),
                _ => {
                    return Err(KeyError::malformed(
                        key,
                        format!("segment {segment:?} must contain exactly one '='"),
                    ))
                }
            };

            let field = unescape(key, field)?;
            let value = if skip_uri_unescape {
                value.to_string()
            } else {
                unescape(key, value)?
            };
            Ok((field, value))
        })
        .collect()
}

fn unescape(key: &str, raw: &str) -> KeyResult<String> {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .map_err(|e| KeyError::malformed(key, e.to_string()))
}

// ============================================================================
// Watcher Keys
// ============================================================================

/// Canonical identity of a watcher inside its task.
///
/// Format: `train_num=<v>&dep_time=<v>&seat_type=<v>[&car_num=<v>]...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherKey(String);

impl WatcherKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatcherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WatcherKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WatcherKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for WatcherKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Task Keys
// ============================================================================

/// The two kinds of tracking task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Every train of a route on a date.
    List,
    /// One train at one departure time.
    Details,
}

impl TaskKind {
    /// Returns the leading tag used in task keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Details => "details",
        }
    }

    /// Parses a task key tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "list" => Some(Self::List),
            "details" => Some(Self::Details),
            _ => None,
        }
    }

    /// Number of identity parts that follow the tag.
    fn arity(&self) -> usize {
        match self {
            Self::List => 3,
            Self::Details => 5,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Canonical identity of a tracking task, also its wire address.
///
/// Format: `list,<from>,<to>,<date>` or
/// `details,<from>,<to>,<date>,<train_number>,<dep_time>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Builds a key from a kind tag and its identity parts.
    ///
    /// ```
    /// use seatwatch_core::{TaskKey, TaskKind};
    ///
    /// let key = TaskKey::make(TaskKind::List, &["20000000", "20004000", "01.01.2015"]);
    /// assert_eq!(key.as_str(), "list,20000000,20004000,01.01.2015");
    /// ```
    pub fn make<S: AsRef<str>>(kind: TaskKind, parts: &[S]) -> Self {
        let mut key = String::from(kind.tag());
        for part in parts {
            key.push(',');
            key.push_str(part.as_ref());
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the kind encoded in the key's leading tag, if recognised.
    pub fn kind(&self) -> Option<TaskKind> {
        self.0.split(',').next().and_then(TaskKind::from_tag)
    }

    /// Parses the key back into the identity it was built from.
    pub fn identity(&self) -> KeyResult<TaskIdentity> {
        let mut parts = self.0.split(',');
        let tag = parts.next().unwrap_or_default();
        let kind = TaskKind::from_tag(tag)
            .ok_or_else(|| KeyError::malformed(&self.0, format!("unknown task kind {tag:?}")))?;

        let rest: Vec<String> = parts.map(str::to_string).collect();
        if rest.len() != kind.arity() || rest.iter().any(String::is_empty) {
            return Err(KeyError::malformed(
                &self.0,
                format!("{kind} keys carry {} non-empty parts", kind.arity()),
            ));
        }

        let mut rest = rest.into_iter();
        let mut next = || rest.next().unwrap_or_default();
        Ok(match kind {
            TaskKind::List => TaskIdentity::List {
                from: next(),
                to: next(),
                date: next(),
            },
            TaskKind::Details => TaskIdentity::Details {
                from: next(),
                to: next(),
                date: next(),
                train_number: next(),
                departure_time: next(),
            },
        })
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TaskKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a task tracks. Immutable once the task exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskIdentity {
    /// Route search for a date.
    List { from: String, to: String, date: String },
    /// A single train on a route and date.
    Details {
        from: String,
        to: String,
        date: String,
        train_number: String,
        departure_time: String,
    },
}

impl TaskIdentity {
    pub fn list(from: impl Into<String>, to: impl Into<String>, date: impl Into<String>) -> Self {
        Self::List {
            from: from.into(),
            to: to.into(),
            date: date.into(),
        }
    }

    pub fn details(
        from: impl Into<String>,
        to: impl Into<String>,
        date: impl Into<String>,
        train_number: impl Into<String>,
        departure_time: impl Into<String>,
    ) -> Self {
        Self::Details {
            from: from.into(),
            to: to.into(),
            date: date.into(),
            train_number: train_number.into(),
            departure_time: departure_time.into(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::List { .. } => TaskKind::List,
            Self::Details { .. } => TaskKind::Details,
        }
    }

    /// Travel date (`dd.MM.yyyy`).
    pub fn date(&self) -> &str {
        match self {
            Self::List { date, .. } | Self::Details { date, .. } => date,
        }
    }

    /// Computes the canonical key for this identity.
    pub fn key(&self) -> TaskKey {
        match self {
            Self::List { from, to, date } => TaskKey::make(TaskKind::List, &[from, to, date]),
            Self::Details {
                from,
                to,
                date,
                train_number,
                departure_time,
            } => TaskKey::make(
                TaskKind::Details,
                &[from, to, date, train_number, departure_time],
            ),
        }
    }
}

// ============================================================================
// Train Keys
// ============================================================================

/// Groups watchers of a list task by train.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainKey {
    pub date: String,
    pub departure_time: String,
    pub train_number: String,
}

impl TrainKey {
    pub fn new(
        date: impl Into<String>,
        departure_time: impl Into<String>,
        train_number: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            departure_time: departure_time.into(),
            train_number: train_number.into(),
        }
    }

    /// True if this key names the given train and departure time.
    pub fn is_train(&self, train_number: &str, departure_time: &str) -> bool {
        self.train_number == train_number && self.departure_time == departure_time
    }
}

impl fmt::Display for TrainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.date, self.departure_time, self.train_number)
    }
}
