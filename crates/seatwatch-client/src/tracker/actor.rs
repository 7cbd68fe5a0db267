//! Tracker actor - owns the tracker and serializes everything that touches it.
//!
//! Application commands, socket events and the reconnect timer all land in
//! one `select!` loop, so task state is only ever mutated from this task.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored: the caller may have given up

use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::commands::TrackerCommand;
use super::engine::Tracker;
use crate::connection::{Dialer, SocketEvent};

// ============================================================================
// Tracker Actor
// ============================================================================

pub struct TrackerActor<D> {
    tracker: Tracker<D>,

    /// Commands from every [`super::TrackerHandle`] clone.
    receiver: mpsc::Receiver<TrackerCommand>,

    /// Events from every socket driver, all generations.
    socket_events: mpsc::UnboundedReceiver<SocketEvent>,

    reconnect_delay: Duration,

    cancel_token: CancellationToken,
}

impl<D: Dialer> TrackerActor<D> {
    pub fn new(
        tracker: Tracker<D>,
        receiver: mpsc::Receiver<TrackerCommand>,
        socket_events: mpsc::UnboundedReceiver<SocketEvent>,
        reconnect_delay: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            tracker,
            receiver,
            socket_events,
            reconnect_delay,
            cancel_token,
        }
    }

    /// Runs until cancelled or until every handle is dropped.
    pub async fn run(mut self) {
        info!("Tracker actor starting");
        self.tracker.start();

        // At most one reconnect is ever pending.
        let mut reconnect: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    debug!("Tracker actor cancelled");
                    break;
                }

                Some(event) = self.socket_events.recv() => {
                    if self.tracker.handle_socket_event(event) && reconnect.is_none() {
                        debug!(delay_ms = self.reconnect_delay.as_millis() as u64, "Reconnect scheduled");
                        reconnect = Some(Box::pin(sleep(self.reconnect_delay)));
                    }
                }

                () = async {
                    if let Some(timer) = reconnect.as_mut() {
                        timer.await;
                    }
                }, if reconnect.is_some() => {
                    reconnect = None;
                    self.tracker.reconnect();
                }

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("All tracker handles dropped");
                        break;
                    }
                },
            }
        }

        self.tracker.shutdown();
        info!(
            "Tracker actor stopped (tasks: {})",
            self.tracker.registry().len()
        );
    }

    fn handle_command(&mut self, cmd: TrackerCommand) {
        match cmd {
            TrackerCommand::Track {
                identity,
                options,
                spec,
                respond_to,
            } => {
                let result = self.tracker.track(identity, options, spec);
                let _ = respond_to.send(result);
            }
            TrackerCommand::RemoveWatcher {
                task_key,
                watcher_key,
                respond_to,
            } => {
                let result = self.tracker.remove_watcher(&task_key, &watcher_key);
                let _ = respond_to.send(result);
            }
            TrackerCommand::RestartWatcher {
                task_key,
                watcher_key,
                respond_to,
            } => {
                let result = self.tracker.restart_watcher(&task_key, &watcher_key);
                let _ = respond_to.send(result);
            }
            TrackerCommand::RestartTask {
                task_key,
                respond_to,
            } => {
                let result = self.tracker.restart_task(&task_key);
                let _ = respond_to.send(result);
            }
            TrackerCommand::StopTask {
                task_key,
                respond_to,
            } => {
                let result = self.tracker.stop_task(&task_key);
                let _ = respond_to.send(result);
            }
            TrackerCommand::RequestDetails {
                task_key,
                train,
                respond_to,
            } => {
                let result = self.tracker.request_details(&task_key, train);
                let _ = respond_to.send(result);
            }
            TrackerCommand::SetTaskFallback {
                task_key,
                enabled,
                respond_to,
            } => {
                let result = self.tracker.set_task_fallback(&task_key, enabled);
                let _ = respond_to.send(result);
            }
            TrackerCommand::SetFallback {
                enabled,
                respond_to,
            } => {
                let result = self.tracker.set_fallback(enabled);
                let _ = respond_to.send(result);
            }
            TrackerCommand::Login {
                credentials,
                respond_to,
            } => {
                self.tracker.login(credentials);
                let _ = respond_to.send(());
            }
            TrackerCommand::AliasTask {
                alias,
                target,
                respond_to,
            } => {
                let result = self.tracker.alias_task(alias, &target);
                let _ = respond_to.send(result);
            }
            TrackerCommand::GetTask {
                task_key,
                respond_to,
            } => {
                let _ = respond_to.send(self.tracker.task(&task_key));
            }
            TrackerCommand::GetAllTasks { respond_to } => {
                let _ = respond_to.send(self.tracker.tasks());
            }
        }
    }
}
