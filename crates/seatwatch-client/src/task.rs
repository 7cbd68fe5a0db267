//! Task aggregate: one route search (list) or one train (details) and the
//! watchers it owns.
//!
//! Operations that talk to the server take the connection as a
//! [`CommandSink`] and publish through the [`EventBus`]; a task never
//! touches another task's state.
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()` or `todo!()` outside tests.

use std::collections::{HashMap, HashSet};

use seatwatch_core::{
    TaskIdentity, TaskKey, TaskKind, TaskStatus, TrainKey, Watcher, WatcherKey, WatcherSpec,
};
use seatwatch_protocol::{Command, FoundPayload, Grammar, LostPayload, Report, TrainDetails};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connection::CommandSink;
use crate::error::{Result, TrackerError};
use crate::events::{EventBus, TrackerEvent};

/// Stop reason once the last watcher is gone.
pub const REASON_EXHAUSTED: &str = "exhausted";

/// Stop reason when recovery finds nothing left to wait for.
pub const REASON_SUCCEEDED: &str = "succeeded";

// ============================================================================
// Options
// ============================================================================

/// Per-task settings fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Server error codes this task tolerates, sent as `ignore:<codes>`.
    pub error_proof: Vec<String>,
    /// The route has no direct listing: only greedy watchers are allowed.
    pub limited: bool,
}

/// Who brought the task into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    /// Created by `track`.
    Client,
    /// Created from an incoming key the client did not know.
    Server,
}

// ============================================================================
// Variants
// ============================================================================

/// Watchers of one train inside a list task, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainGroup {
    pub watchers: Vec<WatcherKey>,
    pub departed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskVariant {
    List {
        trains: HashMap<TrainKey, TrainGroup>,
    },
    Details {
        train_number: String,
        departure_time: String,
    },
}

impl TaskVariant {
    fn for_identity(identity: &TaskIdentity) -> Self {
        match identity {
            TaskIdentity::List { .. } => Self::List {
                trains: HashMap::new(),
            },
            TaskIdentity::Details {
                train_number,
                departure_time,
                ..
            } => Self::Details {
                train_number: train_number.clone(),
                departure_time: departure_time.clone(),
            },
        }
    }
}

// ============================================================================
// Task
// ============================================================================

#[derive(Debug, Clone)]
pub struct Task {
    key: TaskKey,
    identity: TaskIdentity,
    variant: TaskVariant,
    grammar: Grammar,
    options: TaskOptions,
    origin: TaskOrigin,

    status: TaskStatus,
    attempts_done: u32,
    consecutive_errors: u32,
    watchers: HashMap<WatcherKey, Watcher>,
    /// Watchers with an `unwatch` awaiting the server's `-W:`.
    unwatching: HashSet<WatcherKey>,

    confirmed: bool,
    /// Set while a `remove` awaits the server's `removed`.
    stopping: Option<String>,
    finalized: bool,
    fallback: Option<bool>,
    last_error: Option<Value>,
    aliases: HashSet<TaskKey>,
}

impl Task {
    pub fn new(identity: TaskIdentity, options: TaskOptions, origin: TaskOrigin) -> Self {
        Self {
            key: identity.key(),
            variant: TaskVariant::for_identity(&identity),
            grammar: Grammar::for_kind(identity.kind()),
            identity,
            options,
            origin,
            status: TaskStatus::InProgress,
            attempts_done: 0,
            consecutive_errors: 0,
            watchers: HashMap::new(),
            unwatching: HashSet::new(),
            confirmed: false,
            stopping: None,
            finalized: false,
            fallback: None,
            last_error: None,
            aliases: HashSet::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    pub fn kind(&self) -> TaskKind {
        self.identity.kind()
    }

    pub fn variant(&self) -> &TaskVariant {
        &self.variant
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    pub fn origin(&self) -> TaskOrigin {
        self.origin
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn attempts_done(&self) -> u32 {
        self.attempts_done
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn watcher(&self, key: &WatcherKey) -> Option<&Watcher> {
        self.watchers.get(key)
    }

    pub fn watchers(&self) -> impl Iterator<Item = &Watcher> {
        self.watchers.values()
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Train groups of a list task.
    pub fn trains(&self) -> Option<&HashMap<TrainKey, TrainGroup>> {
        match &self.variant {
            TaskVariant::List { trains } => Some(trains),
            TaskVariant::Details { .. } => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.is_some()
    }

    /// Finalized, or failed beyond restart. A new `track` replaces it.
    pub fn has_ended(&self) -> bool {
        self.finalized || self.status == TaskStatus::FatalFailure
    }

    pub fn is_unwatching(&self, key: &WatcherKey) -> bool {
        self.unwatching.contains(key)
    }

    pub fn fallback(&self) -> Option<bool> {
        self.fallback
    }

    /// Error payload of the last failed attempt.
    pub fn last_error(&self) -> Option<&Value> {
        self.last_error.as_ref()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &TaskKey> {
        self.aliases.iter()
    }

    pub(crate) fn add_alias(&mut self, alias: TaskKey) {
        if alias != self.key {
            self.aliases.insert(alias);
        }
    }

    /// True for the task's own key and its aliases.
    pub fn owns(&self, key: &TaskKey) -> bool {
        *key == self.key || self.aliases.contains(key)
    }

    // ------------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------------

    fn check_watcher(&self, spec: &WatcherSpec) -> Result<()> {
        if let Err(e) = spec.validate() {
            return Err(TrackerError::invalid_watcher(&self.key, e.to_string()));
        }
        if self.options.limited && !spec.is_greedy() {
            return Err(TrackerError::invalid_watcher(
                &self.key,
                "only any-seat watchers are allowed on a limited route",
            ));
        }
        if let TaskVariant::Details {
            train_number,
            departure_time,
        } = &self.variant
        {
            if !spec.is_train(train_number, departure_time) {
                return Err(TrackerError::invalid_watcher(
                    &self.key,
                    format!("watcher is not for train {train_number} at {departure_time}"),
                ));
            }
        }
        Ok(())
    }

    /// Adds a watcher, or returns the existing one with the same key.
    ///
    /// A new watcher is stored before `watch` is sent, so a failed send
    /// leaves it in place for recovery to replay.
    pub fn add_watcher(&mut self, spec: WatcherSpec, sink: &mut dyn CommandSink) -> Result<Watcher> {
        self.check_watcher(&spec)?;

        let watcher = Watcher::new(spec);
        if let Some(existing) = self.watchers.get(watcher.key()) {
            if self.unwatching.contains(watcher.key()) {
                return Err(TrackerError::invalid_watcher(
                    &self.key,
                    "watcher is being removed",
                ));
            }
            return Ok(existing.clone());
        }

        let key = watcher.key().clone();
        debug!(task_key = %self.key, watcher_key = %key, "Adding watcher");
        self.insert(watcher.clone());
        self.send_watch(&key, sink)?;
        Ok(watcher)
    }

    fn insert(&mut self, watcher: Watcher) {
        if let TaskVariant::List { trains } = &mut self.variant {
            let train = watcher.spec().train_key(self.identity.date());
            let group = trains.entry(train).or_default();
            if !group.watchers.contains(watcher.key()) {
                group.watchers.push(watcher.key().clone());
            }
        }
        self.watchers.insert(watcher.key().clone(), watcher);
    }

    fn send_watch(&self, watcher_key: &WatcherKey, sink: &mut dyn CommandSink) -> Result<()> {
        sink.send_command(&Command::watch(
            &self.key,
            watcher_key,
            &self.options.error_proof,
        ))?;
        Ok(())
    }

    /// Removes a watcher.
    ///
    /// Outdated watchers and failed tasks evict locally. An active task
    /// with a watcher the server still tracks sends `unwatch` and evicts
    /// when the server confirms with `-W:`; a reconnect before that
    /// confirmation evicts locally. Everything else evicts locally.
    pub fn remove_watcher(
        &mut self,
        watcher_key: &WatcherKey,
        sink: &mut dyn CommandSink,
        bus: &EventBus,
    ) -> Result<()> {
        let watcher = self
            .watchers
            .get(watcher_key)
            .ok_or_else(|| TrackerError::WatcherNotFound {
                task_key: self.key.clone(),
                watcher_key: watcher_key.clone(),
            })?;

        let server_tracked = self.status.is_active() && !watcher.is_accepted();
        if watcher.is_outdated() || self.status.is_failed() || !server_tracked {
            self.evict(watcher_key, sink, bus);
            return Ok(());
        }

        match sink.send_command(&Command::unwatch(&self.key, watcher_key)) {
            Ok(()) => {
                debug!(task_key = %self.key, watcher_key = %watcher_key, "Awaiting unwatch confirmation");
                self.unwatching.insert(watcher_key.clone());
            }
            Err(e) => {
                // The server forgets the watch with the session; recovery
                // must not replay it.
                debug!(task_key = %self.key, error = %e, "Unwatch not sent, evicting locally");
                self.evict(watcher_key, sink, bus);
            }
        }
        Ok(())
    }

    fn evict(&mut self, watcher_key: &WatcherKey, sink: &mut dyn CommandSink, bus: &EventBus) {
        self.unwatching.remove(watcher_key);
        let Some(watcher) = self.watchers.remove(watcher_key) else {
            return;
        };

        if let TaskVariant::List { trains } = &mut self.variant {
            let train = watcher.spec().train_key(self.identity.date());
            if let Some(group) = trains.get_mut(&train) {
                group.watchers.retain(|key| key != watcher_key);
                if group.watchers.is_empty() {
                    trains.remove(&train);
                }
            }
        }

        debug!(task_key = %self.key, watcher_key = %watcher_key, "Watcher evicted");
        bus.publish(TrackerEvent::WatcherRemoved {
            task_key: self.key.clone(),
            watcher_key: watcher_key.clone(),
            departed: false,
        });

        if self.watchers.is_empty() {
            self.stop(REASON_EXHAUSTED, sink, bus);
        }
    }

    /// Puts a watcher back to `Waiting` and re-sends `watch`.
    ///
    /// Any non-outdated watcher restarts on a failed task; otherwise only
    /// accepted ones do. Returns whether the watcher restarted.
    pub fn restart_watcher(
        &mut self,
        watcher_key: &WatcherKey,
        sink: &mut dyn CommandSink,
    ) -> Result<bool> {
        let force = self.status.is_failed();
        let watcher = self
            .watchers
            .get_mut(watcher_key)
            .ok_or_else(|| TrackerError::WatcherNotFound {
                task_key: self.key.clone(),
                watcher_key: watcher_key.clone(),
            })?;

        if !watcher.restart(force) {
            return Ok(false);
        }
        self.send_watch(watcher_key, sink)?;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Task lifecycle
    // ------------------------------------------------------------------------

    /// Resumes a failed task.
    pub fn restart(&mut self, sink: &mut dyn CommandSink, bus: &EventBus) -> Result<usize> {
        if !self.status.is_recoverable() {
            return Err(TrackerError::NotRecoverable {
                task_key: self.key.clone(),
                status: self.status,
            });
        }

        info!(task_key = %self.key, "Restarting task");
        self.status = TaskStatus::InProgress;
        self.consecutive_errors = 0;
        self.last_error = None;
        for watcher in self.watchers.values_mut() {
            watcher.restart(true);
        }
        self.recover(sink, bus)
    }

    /// Replays `watch` for every waiting watcher after a reconnect.
    ///
    /// Watchers with an unconfirmed `unwatch` are evicted, never replayed.
    /// A task whose watchers all succeeded is stopped instead, and a task
    /// with a pending stop re-sends `remove`. Returns the number of
    /// watchers re-sent.
    pub fn recover(&mut self, sink: &mut dyn CommandSink, bus: &EventBus) -> Result<usize> {
        if self.finalized {
            return Ok(0);
        }
        if let Some(reason) = self.stopping.take() {
            self.status = TaskStatus::InProgress;
            self.stop(&reason, sink, bus);
            return Ok(0);
        }

        let unwatched: Vec<WatcherKey> = self.unwatching.drain().collect();
        for key in &unwatched {
            debug!(task_key = %self.key, watcher_key = %key, "Unwatch unconfirmed, evicting");
            self.evict(key, sink, bus);
        }
        if !unwatched.is_empty() && self.watchers.is_empty() {
            // The last eviction already stopped the task.
            return Ok(0);
        }

        if !self.status.is_active() {
            return Ok(0);
        }

        if self.watchers.is_empty() {
            self.stop(REASON_EXHAUSTED, sink, bus);
            return Ok(0);
        }
        if self.watchers.values().all(Watcher::is_succeeded) {
            self.stop(REASON_SUCCEEDED, sink, bus);
            return Ok(0);
        }

        let waiting: Vec<WatcherKey> = self
            .watchers
            .values()
            .filter(|watcher| watcher.is_waiting())
            .map(|watcher| watcher.key().clone())
            .collect();

        info!(task_key = %self.key, watchers = waiting.len(), "Recovering task");
        for key in &waiting {
            self.send_watch(key, sink)?;
        }
        Ok(waiting.len())
    }

    /// Stops the task.
    ///
    /// An active task sends `remove` and finalizes on `removed`. An inactive
    /// task, or one whose `remove` cannot be sent, finalizes immediately.
    pub fn stop(&mut self, reason: &str, sink: &mut dyn CommandSink, bus: &EventBus) {
        if self.finalized || self.stopping.is_some() {
            return;
        }

        if self.status.is_active() {
            match sink.send_command(&Command::remove(&self.key)) {
                Ok(()) => {
                    info!(task_key = %self.key, reason, "Stopping task");
                    self.status = TaskStatus::Stopped;
                    self.stopping = Some(reason.to_string());
                    return;
                }
                Err(e) => debug!(task_key = %self.key, error = %e, "Remove not sent"),
            }
        }
        self.accept_stop(Some(reason.to_string()), bus);
    }

    /// Finalizes the task; the registry drops it afterwards.
    pub fn accept_stop(&mut self, reason: Option<String>, bus: &EventBus) {
        if self.finalized {
            return;
        }
        let reason = reason.or_else(|| self.stopping.take());

        info!(task_key = %self.key, reason = reason.as_deref().unwrap_or("-"), "Task removed");
        self.status = TaskStatus::Stopped;
        self.stopping = None;
        self.finalized = true;
        self.watchers.clear();
        self.unwatching.clear();
        if let TaskVariant::List { trains } = &mut self.variant {
            trains.clear();
        }

        bus.publish(TrackerEvent::TaskRemoved {
            task_key: self.key.clone(),
            reason,
        });
    }

    /// Asks for the detail payload of a train.
    ///
    /// Details tasks default to their own train.
    pub fn request_details(
        &self,
        train: Option<(&str, &str)>,
        sink: &mut dyn CommandSink,
    ) -> Result<()> {
        let (train_number, departure_time) = match (train, &self.variant) {
            (Some(train), _) => train,
            (
                None,
                TaskVariant::Details {
                    train_number,
                    departure_time,
                },
            ) => (train_number.as_str(), departure_time.as_str()),
            (None, TaskVariant::List { .. }) => {
                return Err(TrackerError::MissingTrain(self.key.clone()))
            }
        };

        sink.send_command(&Command::GetDetails {
            task_key: self.key.clone(),
            train_number: train_number.to_string(),
            departure_time: departure_time.to_string(),
        })?;
        Ok(())
    }

    /// Toggles fallback search for this task.
    pub fn set_fallback(&mut self, enabled: bool, sink: &mut dyn CommandSink) -> Result<()> {
        sink.send_command(&Command::SetFallbackFor {
            task_key: self.key.clone(),
            enabled,
        })?;
        self.fallback = Some(enabled);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    /// Parses and applies one report addressed to this task.
    ///
    /// The first message for a task confirms it; a server-origin task
    /// announces itself at that point.
    pub fn receive(&mut self, body: &str, sink: &mut dyn CommandSink, bus: &EventBus) -> Result<()> {
        if !self.confirmed {
            self.confirmed = true;
            if self.origin == TaskOrigin::Server {
                info!(task_key = %self.key, "Task emerged");
                bus.publish(TrackerEvent::TaskEmerged {
                    task_key: self.key.clone(),
                });
            }
        }

        let report = self.grammar.parse(body)?;
        debug!(task_key = %self.key, report = report.name(), "Applying report");
        self.apply(report, sink, bus);
        Ok(())
    }

    pub fn apply(&mut self, report: Report, sink: &mut dyn CommandSink, bus: &EventBus) {
        match report {
            Report::Attempt {
                status,
                errored,
                error,
            } => self.on_attempt(status, errored, error, bus),
            Report::WatcherRemoved {
                watcher_key,
                departed: true,
            } => self.on_departed_watcher(&watcher_key, bus),
            Report::WatcherRemoved {
                watcher_key,
                departed: false,
            } => self.evict(&watcher_key, sink, bus),
            Report::WatcherAdded { watcher_key } => self.on_watcher_added(watcher_key),
            Report::Removed { reason } => self.accept_stop(reason, bus),
            Report::Found(payload) => self.on_found(&payload, bus),
            Report::Lost(payload) => self.on_lost(&payload, bus),
            Report::Details(details) => self.on_details(details, bus),
            Report::Vanished {
                train_number,
                departure_time,
            } => self.on_vanished(&train_number, &departure_time, sink),
            Report::Departed {
                train_number,
                departure_time,
            } => self.on_train_departed(&train_number, &departure_time, bus),
        }
    }

    fn on_attempt(&mut self, status: TaskStatus, errored: bool, error: Option<Value>, bus: &EventBus) {
        self.attempts_done += 1;
        self.status = status;
        if errored {
            self.consecutive_errors += 1;
        } else {
            self.consecutive_errors = 0;
        }

        if status.is_failed() {
            warn!(task_key = %self.key, %status, "Task attempt failed");
            self.last_error = error.clone();
            bus.publish(TrackerEvent::Failure {
                task_key: self.key.clone(),
                status,
                error,
            });
        }
    }

    fn on_watcher_added(&mut self, watcher_key: WatcherKey) {
        if self.watchers.contains_key(&watcher_key) {
            return;
        }
        match WatcherSpec::from_key(&watcher_key) {
            Ok(spec) => {
                debug!(task_key = %self.key, watcher_key = %watcher_key, "Adopting watcher");
                self.insert(Watcher::new(spec));
            }
            Err(e) => warn!(task_key = %self.key, error = %e, "Cannot adopt watcher"),
        }
    }

    fn on_found(&mut self, payload: &FoundPayload, bus: &EventBus) {
        let entries: Vec<(WatcherKey, Value)> = payload
            .entries_for(|key| self.owns(key))
            .into_iter()
            .map(|(key, cars)| (key.clone(), cars.clone()))
            .collect();

        let mut succeeded = Vec::new();
        for (key, cars) in entries {
            if let Some(watcher) = self.watchers.get_mut(&key) {
                if watcher.claim_succeeded(cars) {
                    succeeded.push(watcher.clone());
                }
            }
        }

        if !succeeded.is_empty() {
            info!(task_key = %self.key, watchers = succeeded.len(), "Seats found");
            bus.publish(TrackerEvent::Found {
                task_key: self.key.clone(),
                watchers: succeeded,
            });
        }
    }

    fn on_lost(&mut self, payload: &LostPayload, bus: &EventBus) {
        let keys: Vec<WatcherKey> = payload
            .watchers_for(|key| self.owns(key))
            .into_iter()
            .cloned()
            .collect();

        let lost: Vec<WatcherKey> = keys
            .into_iter()
            .filter(|key| {
                self.watchers
                    .get_mut(key)
                    .is_some_and(|watcher| watcher.claim_failed())
            })
            .collect();

        if !lost.is_empty() {
            info!(task_key = %self.key, watchers = lost.len(), "Seats lost");
            bus.publish(TrackerEvent::Lost {
                task_key: self.key.clone(),
                watchers: lost,
            });
        }
    }

    fn on_details(&mut self, details: Box<TrainDetails>, bus: &EventBus) {
        for key in &details.accepted {
            if let Some(watcher) = self.watchers.get_mut(key) {
                if watcher.accept() {
                    debug!(task_key = %self.key, watcher_key = %key, "Watcher accepted");
                }
            }
        }
        bus.publish(TrackerEvent::TrainDetails {
            task_key: self.key.clone(),
            details,
        });
    }

    fn on_vanished(&mut self, train_number: &str, departure_time: &str, sink: &mut dyn CommandSink) {
        let restarted: Vec<WatcherKey> = self
            .watchers
            .values_mut()
            .filter(|watcher| {
                watcher.is_accepted() && watcher.spec().is_train(train_number, departure_time)
            })
            .filter_map(|watcher| watcher.restart(true).then(|| watcher.key().clone()))
            .collect();

        for key in &restarted {
            if let Err(e) = self.send_watch(key, sink) {
                warn!(task_key = %self.key, watcher_key = %key, error = %e, "Re-watch deferred to recovery");
            }
        }
    }

    fn on_departed_watcher(&mut self, watcher_key: &WatcherKey, bus: &EventBus) {
        let Some(watcher) = self.watchers.get_mut(watcher_key) else {
            debug!(task_key = %self.key, watcher_key = %watcher_key, "Departure for unknown watcher");
            return;
        };
        watcher.claim_outdated();
        let train = watcher.spec().train_key(self.identity.date());

        bus.publish(TrackerEvent::WatcherRemoved {
            task_key: self.key.clone(),
            watcher_key: watcher_key.clone(),
            departed: true,
        });
        self.mark_departed_groups(&[train]);
        self.escalate_outdated(bus);
    }

    fn on_train_departed(&mut self, train_number: &str, departure_time: &str, bus: &EventBus) {
        let mut trains = Vec::new();
        for watcher in self.watchers.values_mut() {
            if watcher.spec().is_train(train_number, departure_time) {
                watcher.claim_outdated();
                trains.push(watcher.spec().train_key(self.identity.date()));
            }
        }

        if let TaskVariant::List { trains: groups } = &mut self.variant {
            for (train, group) in groups.iter_mut() {
                if train.is_train(train_number, departure_time) {
                    group.departed = true;
                }
            }
        }

        info!(task_key = %self.key, train_number, departure_time, "Train departed");
        bus.publish(TrackerEvent::Departed {
            task_key: self.key.clone(),
            train_number: train_number.to_string(),
            departure_time: departure_time.to_string(),
        });
        self.mark_departed_groups(&trains);
        self.escalate_outdated(bus);
    }

    /// Marks groups departed once all their watchers are outdated.
    fn mark_departed_groups(&mut self, trains: &[TrainKey]) {
        let TaskVariant::List { trains: groups } = &mut self.variant else {
            return;
        };
        for train in trains {
            if let Some(group) = groups.get_mut(train) {
                let all_outdated = group.watchers.iter().all(|key| {
                    self.watchers
                        .get(key)
                        .map_or(true, Watcher::is_outdated)
                });
                if all_outdated {
                    group.departed = true;
                }
            }
        }
    }

    /// A details task fails on its first outdated watcher; a list task
    /// once every watcher is outdated.
    fn escalate_outdated(&mut self, bus: &EventBus) {
        if self.status == TaskStatus::FatalFailure {
            return;
        }
        let escalate = match &self.variant {
            TaskVariant::Details { .. } => self.watchers.values().any(Watcher::is_outdated),
            TaskVariant::List { .. } => {
                !self.watchers.is_empty() && self.watchers.values().all(Watcher::is_outdated)
            }
        };
        if !escalate {
            return;
        }

        warn!(task_key = %self.key, "All watched trains departed");
        self.status = TaskStatus::FatalFailure;
        bus.publish(TrackerEvent::Failure {
            task_key: self.key.clone(),
            status: TaskStatus::FatalFailure,
            error: None,
        });
    }
}
