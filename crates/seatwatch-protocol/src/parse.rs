//! JSON bodies carried by task reports.
//!
//! `found` and `lost` arrive in two shapes: addressed to the task the line
//! belongs to (`{watcher_key: ...}` / `[watcher_key, ...]`), or nested under
//! task keys (`{task_key: {watcher_key: ...}}`) when the server reports on
//! forked tasks. Both shapes decode into the same payload types.

use std::collections::HashMap;

use seatwatch_core::{TaskKey, WatcherKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// found
// ============================================================================

/// Body of a `found` report.
///
/// The per-watcher value is opaque match data and is handed to the watcher
/// as is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "HashMap<String, Value>")]
pub struct FoundPayload {
    /// Entries for the task the line is addressed to.
    direct: HashMap<WatcherKey, Value>,
    /// Entries nested under explicit task keys.
    by_task: HashMap<TaskKey, HashMap<WatcherKey, Value>>,
}

impl FoundPayload {
    /// Collects the entries that belong to a task.
    ///
    /// Direct entries always belong to the addressed task; nested entries
    /// belong to it when `owns` accepts their task key.
    pub fn entries_for(&self, owns: impl Fn(&TaskKey) -> bool) -> Vec<(&WatcherKey, &Value)> {
        let nested = self
            .by_task
            .iter()
            .filter(|(task_key, _)| owns(task_key))
            .flat_map(|(_, watchers)| watchers.iter());
        self.direct.iter().chain(nested).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.by_task.is_empty()
    }
}

impl From<HashMap<String, Value>> for FoundPayload {
    fn from(raw: HashMap<String, Value>) -> Self {
        let mut payload = Self::default();
        for (key, value) in raw {
            let task_key = TaskKey::new(key);
            match (task_key.kind(), value) {
                (Some(_), Value::Object(watchers)) => {
                    let watchers = watchers
                        .into_iter()
                        .map(|(watcher_key, cars)| (WatcherKey::new(watcher_key), cars))
                        .collect();
                    payload.by_task.insert(task_key, watchers);
                }
                (_, value) => {
                    payload
                        .direct
                        .insert(WatcherKey::new(task_key.as_str()), value);
                }
            }
        }
        payload
    }
}

// ============================================================================
// lost
// ============================================================================

/// Body of a `lost` report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LostPayload {
    /// `[watcher_key, ...]` for the addressed task.
    Direct(Vec<WatcherKey>),
    /// `{task_key: [watcher_key, ...]}`
    ByTask(HashMap<TaskKey, Vec<WatcherKey>>),
}

impl LostPayload {
    /// Collects the watcher keys that belong to a task.
    pub fn watchers_for(&self, owns: impl Fn(&TaskKey) -> bool) -> Vec<&WatcherKey> {
        match self {
            Self::Direct(keys) => keys.iter().collect(),
            Self::ByTask(tasks) => tasks
                .iter()
                .filter(|(task_key, _)| owns(task_key))
                .flat_map(|(_, keys)| keys.iter())
                .collect(),
        }
    }
}

// ============================================================================
// details
// ============================================================================

/// Body of a `details` report.
///
/// Only the train identity and the `accepted` list drive state; everything
/// else is kept verbatim for the application.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrainDetails {
    #[serde(rename = "train_num", default)]
    pub train_number: String,
    #[serde(rename = "dep_time", default)]
    pub departure_time: String,
    /// Watchers whose seats the user took.
    #[serde(default)]
    pub accepted: Vec<WatcherKey>,
    #[serde(flatten)]
    pub info: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK: &str = "list,2000000,2060150,31.12.2019";
    const WATCHER: &str = "train_num=258А&dep_time=13:45&seat_type=Купе";

    fn own_task(key: &TaskKey) -> bool {
        key.as_str() == TASK
    }

    #[test]
    fn test_found_direct() {
        let json = format!(r#"{{"{WATCHER}": {{"freeSeats": 170}}}}"#);
        let payload: FoundPayload = serde_json::from_str(&json).unwrap();

        let entries = payload.entries_for(|_| false);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.as_str(), WATCHER);
        assert_eq!(entries[0].1["freeSeats"], 170);
    }

    #[test]
    fn test_found_nested() {
        let json = format!(
            r#"{{"{TASK}": {{"{WATCHER}": {{"freeSeats": 170}}}}, "list,1,2,3": {{"x=1": {{}}}}}}"#
        );
        let payload: FoundPayload = serde_json::from_str(&json).unwrap();

        let entries = payload.entries_for(own_task);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.as_str(), WATCHER);
        assert!(payload.entries_for(|_| false).is_empty());
    }

    #[test]
    fn test_found_empty() {
        let payload: FoundPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.is_empty());
        assert!(serde_json::from_str::<FoundPayload>("[1, 2]").is_err());
    }

    #[test]
    fn test_lost_shapes() {
        let direct: LostPayload = serde_json::from_str(&format!(r#"["{WATCHER}"]"#)).unwrap();
        assert_eq!(direct.watchers_for(|_| false).len(), 1);

        let nested: LostPayload =
            serde_json::from_str(&format!(r#"{{"{TASK}": ["{WATCHER}"], "list,1,2,3": ["a=b"]}}"#))
                .unwrap();
        let keys = nested.watchers_for(own_task);
        assert_eq!(keys, vec![&WatcherKey::new(WATCHER)]);
    }

    #[test]
    fn test_train_details_parsing() {
        let json = r#"{
            "train_num": "054Ч",
            "dep_time": "23:40",
            "accepted": ["train_num=054Ч&dep_time=23:40&seat_type=Плац"],
            "cars": [{"cnumber": "05", "freeSeats": 3}]
        }"#;
        let details: TrainDetails = serde_json::from_str(json).unwrap();

        assert_eq!(details.train_number, "054Ч");
        assert_eq!(details.departure_time, "23:40");
        assert_eq!(details.accepted.len(), 1);
        assert!(details.info.contains_key("cars"));
    }

    #[test]
    fn test_train_details_minimal() {
        let details: TrainDetails = serde_json::from_str("{}").unwrap();
        assert!(details.accepted.is_empty());
        assert!(details.train_number.is_empty());
    }
}
