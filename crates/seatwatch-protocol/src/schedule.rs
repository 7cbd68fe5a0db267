//! Client-side filtering of stored schedules.
//!
//! A stored schedule is a list of rows keyed by `[from, to, date, ...]`,
//! each carrying one train with its departure time in `time0`. Trains
//! that already left are dropped by comparing formatted local time
//! strings, never parsed timestamps.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Date format of the key's date component.
const DATE_FORMAT: &str = "%d.%m.%Y";

/// Time format of `time0`.
const TIME_FORMAT: &str = "%H:%M";

/// Position of the date inside a row key.
const DATE_SLOT: usize = 2;

/// One train of a stored schedule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduleEntry {
    /// Departure time, `HH:MM`.
    pub time0: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoredRow {
    pub key: Vec<Value>,
    pub value: ScheduleEntry,
}

impl StoredRow {
    fn date(&self) -> Option<&str> {
        self.key.get(DATE_SLOT).and_then(Value::as_str)
    }
}

/// Response body of a stored-schedule lookup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StoredSchedule {
    #[serde(default)]
    pub rows: Vec<StoredRow>,
}

/// Returns the trains of `schedule` that have not departed as of `now`.
///
/// All rows share one date, read from the first row. Only today's rows
/// are filtered, keeping trains departing strictly later than `now`; any
/// other (or unreadable) date keeps everything.
pub fn filter_departed(schedule: &StoredSchedule, now: NaiveDateTime) -> Vec<ScheduleEntry> {
    let Some(first) = schedule.rows.first() else {
        return Vec::new();
    };

    let today = now.date();
    let date = first
        .date()
        .and_then(|date| NaiveDate::parse_from_str(date, DATE_FORMAT).ok());

    if date != Some(today) {
        return schedule.rows.iter().map(|row| row.value.clone()).collect();
    }

    let current = now.format(TIME_FORMAT).to_string();
    schedule
        .rows
        .iter()
        .filter(|row| row.value.time0 > current)
        .map(|row| row.value.clone())
        .collect()
}
