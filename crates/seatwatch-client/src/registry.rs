//! Task registry: one task per canonical key, plus server-assigned aliases.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use seatwatch_core::{KeyError, TaskIdentity, TaskKey};
use tracing::{debug, info};

use crate::error::{Result, TrackerError};
use crate::task::{Task, TaskOptions, TaskOrigin};

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskKey, Task>,
    /// Forked key → owning task key.
    aliases: HashMap<TaskKey, TaskKey>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the task for `identity`, creating it when absent.
    ///
    /// `options` only apply to a newly created task. An ended task is
    /// replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// - `TrackerError::TaskStopping` while the task awaits `removed`
    pub fn get_or_create(&mut self, identity: TaskIdentity, options: TaskOptions) -> Result<&mut Task> {
        let key = identity.key();
        if let Some(task) = self.tasks.get(&key) {
            if task.is_stopping() {
                return Err(TrackerError::TaskStopping(key));
            }
            if task.has_ended() {
                debug!(task_key = %key, status = %task.status(), "Replacing ended task");
                self.remove(&key);
            }
        }

        Ok(self.tasks.entry(key).or_insert_with_key(|key| {
            info!(task_key = %key, "Creating task");
            Task::new(identity, options, TaskOrigin::Client)
        }))
    }

    /// Maps a key (own or alias) to the owning task's key.
    pub fn resolve(&self, key: &TaskKey) -> Option<&TaskKey> {
        if let Some((own, _)) = self.tasks.get_key_value(key) {
            return Some(own);
        }
        self.aliases.get(key)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Task> {
        let key = self.resolve(key)?;
        self.tasks.get(key)
    }

    pub fn get_mut(&mut self, key: &TaskKey) -> Option<&mut Task> {
        let key = self.resolve(key)?.clone();
        self.tasks.get_mut(&key)
    }

    /// Resolves an incoming key, creating a speculative server-origin task
    /// for a well-formed key nobody knows yet.
    pub fn resolve_or_create(&mut self, key: &TaskKey) -> std::result::Result<&mut Task, KeyError> {
        let own = match self.resolve(key) {
            Some(own) => own.clone(),
            None => key.identity()?.key(),
        };

        match self.tasks.entry(own) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let identity = entry.key().identity()?;
                debug!(task_key = %entry.key(), "Creating task from server message");
                Ok(entry.insert(Task::new(
                    identity,
                    TaskOptions::default(),
                    TaskOrigin::Server,
                )))
            }
        }
    }

    /// Registers `alias` as another name of `target`.
    ///
    /// Returns false when the target is unknown or the alias is a task of
    /// its own.
    pub fn alias(&mut self, alias: TaskKey, target: &TaskKey) -> bool {
        if self.tasks.contains_key(&alias) {
            return false;
        }
        let Some(own) = self.resolve(target).cloned() else {
            return false;
        };
        let Some(task) = self.tasks.get_mut(&own) else {
            return false;
        };

        debug!(alias = %alias, task_key = %own, "Aliasing task");
        task.add_alias(alias.clone());
        self.aliases.insert(alias, own);
        true
    }

    /// Drops a task and its aliases.
    pub fn remove(&mut self, key: &TaskKey) -> Option<Task> {
        let own = self.resolve(key)?.clone();
        self.aliases.retain(|_, target| *target != own);
        self.tasks.remove(&own)
    }

    /// Drops finalized tasks and their aliases; returns their keys.
    pub fn sweep_finalized(&mut self) -> Vec<TaskKey> {
        let removed: Vec<TaskKey> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.is_finalized())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &removed {
            self.tasks.remove(key);
            debug!(task_key = %key, "Task dropped from registry");
        }
        if !removed.is_empty() {
            self.aliases.retain(|_, own| !removed.contains(own));
        }
        removed
    }

    pub fn keys(&self) -> Vec<TaskKey> {
        self.tasks.keys().cloned().collect()
    }

    pub fn active_keys(&self) -> Vec<TaskKey> {
        self.tasks
            .values()
            .filter(|task| task.status().is_active())
            .map(|task| task.key().clone())
            .collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::CommandSink;
    use crate::error::ConnectionError;
    use crate::events::EventBus;
    use seatwatch_core::{TaskStatus, WatcherSpec};
    use seatwatch_protocol::Command;

    #[derive(Default)]
    struct RecordingSink {
        lines: Vec<String>,
    }

    impl CommandSink for RecordingSink {
        fn send_command(&mut self, command: &Command) -> std::result::Result<(), ConnectionError> {
            self.lines.push(command.to_string());
            Ok(())
        }
    }

    fn identity() -> TaskIdentity {
        TaskIdentity::list("2000000", "2060150", "31.12.2019")
    }

    #[test]
    fn test_get_or_create_returns_same_task() {
        let mut registry = TaskRegistry::new();

        let first = registry
            .get_or_create(identity(), TaskOptions::default())
            .unwrap()
            .key()
            .clone();
        registry
            .get_or_create(
                identity(),
                TaskOptions {
                    limited: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(first.as_str(), "list,2000000,2060150,31.12.2019");
        // First creation wins.
        assert!(!registry.get(&first).unwrap().options().limited);
    }

    #[test]
    fn test_resolve_or_create_server_task() {
        let mut registry = TaskRegistry::new();
        let key = TaskKey::new("details,1,2,31.12.2019,054Ч,23:40");

        let task = registry.resolve_or_create(&key).unwrap();
        assert_eq!(task.origin(), TaskOrigin::Server);
        assert_eq!(registry.len(), 1);

        assert!(registry.resolve_or_create(&TaskKey::new("bogus")).is_err());
        assert!(registry
            .resolve_or_create(&TaskKey::new("list,1,2"))
            .is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_alias_resolution_and_sweep() {
        let mut registry = TaskRegistry::new();
        let own = registry
            .get_or_create(identity(), TaskOptions::default())
            .unwrap()
            .key()
            .clone();
        let fork = TaskKey::new("list,2000000,2060150,31.12.2019,f1");

        assert!(registry.alias(fork.clone(), &own));
        assert!(!registry.alias(TaskKey::new("list,x,y,z"), &TaskKey::new("list,9,9,9")));
        assert_eq!(registry.resolve(&fork), Some(&own));
        assert_eq!(
            registry.resolve_or_create(&fork).unwrap().key(),
            &own
        );
        assert_eq!(registry.len(), 1);

        let bus = EventBus::default();
        registry
            .get_mut(&fork)
            .unwrap()
            .accept_stop(Some("done".to_string()), &bus);

        assert_eq!(registry.sweep_finalized(), vec![own.clone()]);
        assert!(registry.is_empty());
        assert_eq!(registry.resolve(&fork), None);
    }

    #[test]
    fn test_active_keys() {
        let mut registry = TaskRegistry::new();
        registry
            .get_or_create(identity(), TaskOptions::default())
            .unwrap();
        registry
            .get_or_create(
                TaskIdentity::list("1", "2", "01.01.2020"),
                TaskOptions::default(),
            )
            .unwrap();
        assert_eq!(registry.active_keys().len(), 2);
        assert!(registry
            .tasks()
            .all(|task| task.status() == TaskStatus::InProgress));
    }

    #[test]
    fn test_stopping_task_rejects_new_watchers() {
        let mut registry = TaskRegistry::new();
        let mut sink = RecordingSink::default();
        let bus = EventBus::default();
        let task = registry
            .get_or_create(identity(), TaskOptions::default())
            .unwrap();
        task.add_watcher(WatcherSpec::any_seat("1", "10:00"), &mut sink)
            .unwrap();
        task.stop("user", &mut sink, &bus);
        assert!(task.is_stopping());

        assert!(matches!(
            registry.get_or_create(identity(), TaskOptions::default()),
            Err(TrackerError::TaskStopping(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ended_task_is_replaced() {
        let mut registry = TaskRegistry::new();
        let mut sink = RecordingSink::default();
        let bus = EventBus::default();
        let key = identity().key();
        let fork = TaskKey::new("list,2000000,2060150,31.12.2019,f1");

        let task = registry
            .get_or_create(identity(), TaskOptions::default())
            .unwrap();
        task.add_watcher(WatcherSpec::any_seat("1", "10:00"), &mut sink)
            .unwrap();
        task.receive("6-", &mut sink, &bus).unwrap();
        assert!(task.has_ended());
        assert!(registry.alias(fork.clone(), &key));

        let fresh = registry
            .get_or_create(identity(), TaskOptions::default())
            .unwrap();
        assert_eq!(fresh.status(), TaskStatus::InProgress);
        assert_eq!(fresh.watcher_count(), 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(&fork), None);
    }
}
