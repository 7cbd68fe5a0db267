//! Synchronous tracker core.
//!
//! `Tracker` owns the connection, the task registry and the event bus.
//! Every method runs to completion without awaiting; the actor calls them
//! one at a time.

use seatwatch_core::{TaskIdentity, TaskKey, Watcher, WatcherKey, WatcherSpec};
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::connection::{ConnectionManager, Dialer, SocketEvent, SocketOutcome};
use crate::error::{Result, TrackerError};
use crate::events::{EventBus, TrackerEvent};
use crate::registry::TaskRegistry;
use crate::task::{Task, TaskOptions};

/// Stop reason for an application-requested stop.
pub const REASON_USER: &str = "user";

pub struct Tracker<D> {
    connection: ConnectionManager<D>,
    registry: TaskRegistry,
    bus: EventBus,
}

fn lookup<'a>(registry: &'a mut TaskRegistry, task_key: &TaskKey) -> Result<&'a mut Task> {
    registry
        .get_mut(task_key)
        .ok_or_else(|| TrackerError::TaskNotFound(task_key.clone()))
}

impl<D: Dialer> Tracker<D> {
    pub fn new(connection: ConnectionManager<D>, bus: EventBus) -> Self {
        Self {
            connection,
            registry: TaskRegistry::new(),
            bus,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<D> {
        &self.connection
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Dials the first socket.
    pub fn start(&mut self) {
        self.connection.connect();
    }

    pub fn shutdown(&mut self) {
        self.connection.shutdown();
    }

    // ========================================================================
    // Application operations
    // ========================================================================

    /// Finds or creates the task and adds the watcher to it.
    ///
    /// A task still waiting for `removed` refuses new watchers; an ended
    /// one is replaced.
    pub fn track(
        &mut self,
        identity: TaskIdentity,
        options: TaskOptions,
        spec: WatcherSpec,
    ) -> Result<Watcher> {
        let task_key = identity.key();
        let existed = self
            .registry
            .get(&task_key)
            .is_some_and(|task| !task.has_ended());

        let task = self.registry.get_or_create(identity, options)?;
        let result = task.add_watcher(spec, &mut self.connection);

        // A rejected first watcher must not leave an empty active task.
        if result.is_err() && !existed && task.watcher_count() == 0 {
            debug!(task_key = %task_key, "Discarding task without watchers");
            self.registry.remove(&task_key);
        }
        result
    }

    pub fn remove_watcher(&mut self, task_key: &TaskKey, watcher_key: &WatcherKey) -> Result<()> {
        let task = lookup(&mut self.registry, task_key)?;
        let result = task.remove_watcher(watcher_key, &mut self.connection, &self.bus);
        self.registry.sweep_finalized();
        result
    }

    pub fn restart_watcher(&mut self, task_key: &TaskKey, watcher_key: &WatcherKey) -> Result<bool> {
        let task = lookup(&mut self.registry, task_key)?;
        task.restart_watcher(watcher_key, &mut self.connection)
    }

    pub fn restart_task(&mut self, task_key: &TaskKey) -> Result<usize> {
        let task = lookup(&mut self.registry, task_key)?;
        let result = task.restart(&mut self.connection, &self.bus);
        self.registry.sweep_finalized();
        result
    }

    pub fn stop_task(&mut self, task_key: &TaskKey) -> Result<()> {
        let task = lookup(&mut self.registry, task_key)?;
        task.stop(REASON_USER, &mut self.connection, &self.bus);
        self.registry.sweep_finalized();
        Ok(())
    }

    pub fn request_details(
        &mut self,
        task_key: &TaskKey,
        train: Option<(String, String)>,
    ) -> Result<()> {
        let task = lookup(&mut self.registry, task_key)?;
        let train = train
            .as_ref()
            .map(|(number, time)| (number.as_str(), time.as_str()));
        task.request_details(train, &mut self.connection)
    }

    pub fn set_task_fallback(&mut self, task_key: &TaskKey, enabled: bool) -> Result<()> {
        let task = lookup(&mut self.registry, task_key)?;
        task.set_fallback(enabled, &mut self.connection)
    }

    pub fn set_fallback(&mut self, enabled: bool) -> Result<()> {
        self.connection.set_fallback(enabled)?;
        Ok(())
    }

    pub fn login(&mut self, credentials: Credentials) {
        self.connection.set_credentials(credentials);
    }

    /// Routes reports for `alias` to the task at `target`.
    pub fn alias_task(&mut self, alias: TaskKey, target: &TaskKey) -> Result<()> {
        if self.registry.alias(alias, target) {
            Ok(())
        } else {
            Err(TrackerError::TaskNotFound(target.clone()))
        }
    }

    pub fn task(&self, task_key: &TaskKey) -> Option<Task> {
        self.registry.get(task_key).cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.registry.tasks().cloned().collect()
    }

    // ========================================================================
    // Socket events
    // ========================================================================

    /// Applies a socket event. Returns true when a reconnect is due.
    pub fn handle_socket_event(&mut self, event: SocketEvent) -> bool {
        match self.connection.handle_event(event) {
            SocketOutcome::Handled => false,
            SocketOutcome::Reconnect => true,
            SocketOutcome::Report { task_key, body } => {
                self.route_report(&task_key, &body);
                false
            }
        }
    }

    fn route_report(&mut self, task_key: &TaskKey, body: &str) {
        let task = match self.registry.resolve_or_create(task_key) {
            Ok(task) => task,
            Err(e) => {
                warn!(task_key = %task_key, error = %e, "Dropping line for unknown task");
                return;
            }
        };

        if let Err(e) = task.receive(body, &mut self.connection, &self.bus) {
            warn!(task_key = %task_key, error = %e, "Dropping report");
        }
        self.registry.sweep_finalized();
    }

    /// Dials a new socket and replays every task onto it.
    pub fn reconnect(&mut self) {
        info!("Reconnecting");
        self.connection.connect();
        self.bus.publish(TrackerEvent::Reconnected);

        for task_key in self.registry.keys() {
            let Some(task) = self.registry.get_mut(&task_key) else {
                continue;
            };
            match task.recover(&mut self.connection, &self.bus) {
                Ok(resent) if resent > 0 => debug!(task_key = %task_key, resent, "Task recovered"),
                Ok(_) => {}
                Err(e) => warn!(task_key = %task_key, error = %e, "Recovery failed"),
            }
        }
        self.registry.sweep_finalized();
    }
}
