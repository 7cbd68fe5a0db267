//! Watcher entity: one seat-availability request and its lifecycle.
//!
//! ```text
//! Waiting ⇄ Succeeded → Accepted ⇄ Waiting
//!    └──────────┴───────────┴──→ Outdated (terminal)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{KeyError, KeyResult};
use crate::key::{decode, encode, TrainKey, WatcherKey};

/// Seat category meaning "any seat matching the coarser criteria".
pub const ANY_SEAT: &str = "*";

// Wire field names, in canonical key order.
const TRAIN_NUM: &str = "train_num";
const DEP_TIME: &str = "dep_time";
const SEAT_TYPE: &str = "seat_type";
const CAR_NUM: &str = "car_num";
const SEAT_NUM: &str = "seat_num";
const SEAT_POS: &str = "seat_pos";

// ============================================================================
// Watcher Spec
// ============================================================================

/// The identity fields of a watcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatcherSpec {
    pub train_number: String,
    pub departure_time: String,
    pub seat_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub car_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_position: Option<String>,
}

impl WatcherSpec {
    pub fn new(
        train_number: impl Into<String>,
        departure_time: impl Into<String>,
        seat_category: impl Into<String>,
    ) -> Self {
        Self {
            train_number: train_number.into(),
            departure_time: departure_time.into(),
            seat_category: seat_category.into(),
            car_number: None,
            seat_number: None,
            seat_position: None,
        }
    }

    /// A greedy spec: any seat on the given train.
    pub fn any_seat(train_number: impl Into<String>, departure_time: impl Into<String>) -> Self {
        Self::new(train_number, departure_time, ANY_SEAT)
    }

    #[must_use]
    pub fn with_car(mut self, car_number: impl Into<String>) -> Self {
        self.car_number = Some(car_number.into());
        self
    }

    #[must_use]
    pub fn with_seat_number(mut self, seat_number: impl Into<String>) -> Self {
        self.seat_number = Some(seat_number.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, seat_position: impl Into<String>) -> Self {
        self.seat_position = Some(seat_position.into());
        self
    }

    pub fn is_greedy(&self) -> bool {
        self.seat_category == ANY_SEAT
    }

    /// Fields in canonical order; absent optionals become empty values.
    pub fn fields(&self) -> [(&'static str, &str); 6] {
        [
            (TRAIN_NUM, self.train_number.as_str()),
            (DEP_TIME, self.departure_time.as_str()),
            (SEAT_TYPE, self.seat_category.as_str()),
            (CAR_NUM, self.car_number.as_deref().unwrap_or_default()),
            (SEAT_NUM, self.seat_number.as_deref().unwrap_or_default()),
            (SEAT_POS, self.seat_position.as_deref().unwrap_or_default()),
        ]
    }

    /// Checks that every value can go on the wire unescaped.
    pub fn validate(&self) -> KeyResult<()> {
        let invalid = |c: char| c.is_whitespace() || c == '&' || c == '=';
        match self.fields().into_iter().find(|(_, value)| value.contains(invalid)) {
            Some((field, value)) => Err(KeyError::InvalidValue {
                field,
                value: value.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Computes the canonical key.
    ///
    /// Values go on the wire as raw UTF-8 (the server matches on the
    /// literal train number and seat type), empty optionals are omitted.
    pub fn key(&self) -> WatcherKey {
        WatcherKey::new(encode(&self.fields(), true, true))
    }

    /// Rebuilds a spec from a key announced by the server.
    pub fn from_key(key: &WatcherKey) -> KeyResult<Self> {
        let mut train_number = None;
        let mut departure_time = None;
        let mut seat_category = None;
        let mut car_number = None;
        let mut seat_number = None;
        let mut seat_position = None;

        for (field, value) in decode(key.as_str(), true)? {
            match field.as_str() {
                TRAIN_NUM => train_number = Some(value),
                DEP_TIME => departure_time = Some(value),
                SEAT_TYPE => seat_category = Some(value),
                CAR_NUM => car_number = Some(value),
                SEAT_NUM => seat_number = Some(value),
                SEAT_POS => seat_position = Some(value),
                other => debug!(key = %key, field = other, "Ignoring unknown watcher key field"),
            }
        }

        let missing = |field: &'static str| KeyError::MissingField {
            key: key.to_string(),
            field,
        };

        Ok(Self {
            train_number: train_number.ok_or_else(|| missing(TRAIN_NUM))?,
            departure_time: departure_time.ok_or_else(|| missing(DEP_TIME))?,
            seat_category: seat_category.ok_or_else(|| missing(SEAT_TYPE))?,
            car_number: car_number.filter(|v| !v.is_empty()),
            seat_number: seat_number.filter(|v| !v.is_empty()),
            seat_position: seat_position.filter(|v| !v.is_empty()),
        })
    }

    /// The list-task grouping key for this watcher on the given date.
    pub fn train_key(&self, date: &str) -> TrainKey {
        TrainKey::new(date, &self.departure_time, &self.train_number)
    }

    /// True if this spec targets the given train and departure time.
    pub fn is_train(&self, train_number: &str, departure_time: &str) -> bool {
        self.train_number == train_number && self.departure_time == departure_time
    }
}

// ============================================================================
// Watcher Status
// ============================================================================

/// Lifecycle state of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherStatus {
    /// Tracked by the server, nothing found yet.
    #[default]
    Waiting,
    /// The server reported matching seats.
    Succeeded,
    /// The user took the match; the server no longer tracks it.
    Accepted,
    /// The train already departed. Terminal.
    Outdated,
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Accepted => write!(f, "accepted"),
            Self::Outdated => write!(f, "outdated"),
        }
    }
}

// ============================================================================
// Watcher
// ============================================================================

/// A single seat watch and its success state.
///
/// Invariant: `found_payload` is `Some` iff the status is `Succeeded` or
/// `Accepted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watcher {
    key: WatcherKey,
    spec: WatcherSpec,
    status: WatcherStatus,
    found_payload: Option<serde_json::Value>,
}

impl Watcher {
    pub fn new(spec: WatcherSpec) -> Self {
        Self {
            key: spec.key(),
            spec,
            status: WatcherStatus::Waiting,
            found_payload: None,
        }
    }

    pub fn key(&self) -> &WatcherKey {
        &self.key
    }

    pub fn spec(&self) -> &WatcherSpec {
        &self.spec
    }

    pub fn status(&self) -> WatcherStatus {
        self.status
    }

    /// Match data supplied by the server (e.g. `{"freeSeats": 170}`).
    pub fn found_payload(&self) -> Option<&serde_json::Value> {
        self.found_payload.as_ref()
    }

    pub fn is_waiting(&self) -> bool {
        self.status == WatcherStatus::Waiting
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == WatcherStatus::Succeeded
    }

    pub fn is_accepted(&self) -> bool {
        self.status == WatcherStatus::Accepted
    }

    pub fn is_outdated(&self) -> bool {
        self.status == WatcherStatus::Outdated
    }

    pub fn is_greedy(&self) -> bool {
        self.spec.is_greedy()
    }

    /// Records a match. Returns true only on `Waiting → Succeeded`.
    ///
    /// Repeated reports while succeeded refresh the payload and return
    /// false. Accepted and outdated watchers ignore the report.
    pub fn claim_succeeded(&mut self, payload: serde_json::Value) -> bool {
        match self.status {
            WatcherStatus::Accepted | WatcherStatus::Outdated => false,
            WatcherStatus::Succeeded => {
                self.found_payload = Some(payload);
                false
            }
            WatcherStatus::Waiting => {
                self.found_payload = Some(payload);
                self.status = WatcherStatus::Succeeded;
                true
            }
        }
    }

    /// Seats were lost again: `Succeeded → Waiting`.
    pub fn claim_failed(&mut self) -> bool {
        if self.status != WatcherStatus::Succeeded {
            return false;
        }
        self.status = WatcherStatus::Waiting;
        self.found_payload = None;
        true
    }

    /// The user took the seats: `Succeeded → Accepted`.
    pub fn accept(&mut self) -> bool {
        if self.status != WatcherStatus::Succeeded {
            return false;
        }
        self.status = WatcherStatus::Accepted;
        true
    }

    /// The train departed.
    pub fn claim_outdated(&mut self) {
        self.status = WatcherStatus::Outdated;
        self.found_payload = None;
    }

    /// Goes back to `Waiting`.
    ///
    /// Without `force` only accepted watchers restart; with `force` any
    /// watcher that is not outdated does.
    pub fn restart(&mut self, force: bool) -> bool {
        let eligible = match self.status {
            WatcherStatus::Accepted => true,
            WatcherStatus::Outdated => false,
            WatcherStatus::Waiting | WatcherStatus::Succeeded => force,
        };
        if eligible {
            self.status = WatcherStatus::Waiting;
            self.found_payload = None;
        }
        eligible
    }
}
