//! The single logical session with the tracking server.
//!
//! `ConnectionManager` owns at most one physical socket at a time. Each
//! socket gets a new generation number; events from older generations are
//! ignored so a late close from a replaced socket cannot tear down the
//! current one.
//!
//! ```text
//! Connecting ──open──▶ Open ──close──▶ Closed ──(delay)──▶ Connecting ...
//! ```
//!
//! The physical socket lives behind the [`Dialer`] seam: the manager only
//! sees outgoing line channels and [`SocketEvent`]s.
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()` or `todo!()` outside tests.

use std::collections::VecDeque;

use seatwatch_core::TaskKey;
use seatwatch_protocol::{Command, SessionMessage};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::error::ConnectionError;

// ============================================================================
// Socket Seam
// ============================================================================

/// Events a socket driver reports back, tagged with the socket generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened { generation: u64 },
    Message { generation: u64, line: String },
    Closed { generation: u64 },
}

impl SocketEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Opened { generation }
            | Self::Message { generation, .. }
            | Self::Closed { generation } => *generation,
        }
    }
}

/// Opens physical sockets.
///
/// `dial` must not block: it starts a driver that reports through `events`
/// and returns the sender for outgoing lines. Dropping that sender closes
/// the socket.
pub trait Dialer: Send + 'static {
    fn dial(
        &mut self,
        generation: u64,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> mpsc::UnboundedSender<String>;
}

/// Anything commands can be written to.
pub trait CommandSink {
    fn send_command(&mut self, command: &Command) -> Result<(), ConnectionError>;
}

// ============================================================================
// Session State
// ============================================================================

/// Process-wide view of the session, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    /// Set once `login_result success` arrives.
    pub logged_in_identity: Option<String>,
    pub fallback_enabled: bool,
}

// ============================================================================
// Connection Manager
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug)]
struct Socket {
    generation: u64,
    state: SocketState,
    outgoing: mpsc::UnboundedSender<String>,
}

pub struct ConnectionManager<D> {
    dialer: D,
    events: mpsc::UnboundedSender<SocketEvent>,
    socket: Option<Socket>,
    next_generation: u64,
    client_name: String,
    credentials: Option<Credentials>,
    logging_in: bool,
    /// Lines sent while the socket is still connecting, flushed FIFO on open.
    preconnect_buffer: VecDeque<String>,
    session: watch::Sender<SessionState>,
}

impl<D: Dialer> ConnectionManager<D> {
    /// Creates a manager without dialing.
    ///
    /// Socket events for every generation are delivered to `events`.
    pub fn new(
        dialer: D,
        events: mpsc::UnboundedSender<SocketEvent>,
        client_name: impl Into<String>,
        credentials: Option<Credentials>,
    ) -> Self {
        let (session, _) = watch::channel(SessionState::default());
        Self {
            dialer,
            events,
            socket: None,
            next_generation: 0,
            client_name: client_name.into(),
            credentials,
            logging_in: false,
            preconnect_buffer: VecDeque::new(),
            session,
        }
    }

    /// Receiver for session state updates.
    pub fn session(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(&self.socket, Some(socket) if socket.state == SocketState::Open)
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn dialer_mut(&mut self) -> &mut D {
        &mut self.dialer
    }

    /// Generation of the current socket, if one was ever dialed.
    pub fn generation(&self) -> Option<u64> {
        self.socket.as_ref().map(|socket| socket.generation)
    }

    /// Dials a new socket unless one is connecting or open.
    pub fn connect(&mut self) {
        if matches!(&self.socket, Some(socket) if socket.state != SocketState::Closed) {
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        info!(generation, "Connecting to tracking server");

        let outgoing = self.dialer.dial(generation, self.events.clone());
        self.socket = Some(Socket {
            generation,
            state: SocketState::Connecting,
            outgoing,
        });
        self.preconnect_buffer.clear();
        self.login();
    }

    /// Replaces the credentials and logs in if possible.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        let changed = self.credentials.as_ref() != Some(&credentials);
        self.credentials = Some(credentials);
        if changed {
            self.session
                .send_modify(|state| state.logged_in_identity = None);
            self.logging_in = false;
        }
        self.login();
    }

    /// Sends `login` once per disconnect cycle.
    ///
    /// Skipped without credentials, while a login is in flight, or once
    /// authenticated.
    pub fn login(&mut self) {
        if self.logging_in || self.session.borrow().logged_in_identity.is_some() {
            return;
        }
        let Some(credentials) = &self.credentials else {
            return;
        };

        let command = Command::Login {
            identity: credentials.identity.clone(),
            client_name: self.client_name.clone(),
            checking_code: credentials.checking_code.clone(),
        };
        match self.send(command.to_string()) {
            Ok(()) => self.logging_in = true,
            Err(e) => debug!(error = %e, "Login deferred until the socket reconnects"),
        }
    }

    /// Sends a line, buffering it while the socket is connecting.
    pub fn send(&mut self, line: String) -> Result<(), ConnectionError> {
        let Some(socket) = &self.socket else {
            return Err(ConnectionError::Closed);
        };

        match socket.state {
            SocketState::Connecting => {
                debug!("ws => (buffered) {line}");
                self.preconnect_buffer.push_back(line);
                Ok(())
            }
            SocketState::Open => {
                debug!("ws => {line}");
                socket
                    .outgoing
                    .send(line)
                    .map_err(|_| ConnectionError::Closed)
            }
            SocketState::Closed => Err(ConnectionError::Closed),
        }
    }

    /// Toggles the session-wide fallback strategy.
    pub fn set_fallback(&mut self, enabled: bool) -> Result<(), ConnectionError> {
        self.send_command(&Command::Fallback { enabled })
    }

    /// Applies a socket event.
    ///
    /// Returns the task key and report body for task lines, and whether a
    /// reconnect must be scheduled.
    pub fn handle_event(&mut self, event: SocketEvent) -> SocketOutcome {
        match event {
            SocketEvent::Opened { generation } => {
                self.on_open(generation);
                SocketOutcome::Handled
            }
            SocketEvent::Message { generation, line } => match self.on_message(generation, &line) {
                Some((task_key, body)) => SocketOutcome::Report { task_key, body },
                None => SocketOutcome::Handled,
            },
            SocketEvent::Closed { generation } => {
                if self.on_close(generation) {
                    SocketOutcome::Reconnect
                } else {
                    SocketOutcome::Handled
                }
            }
        }
    }

    fn current(&mut self, generation: u64) -> Option<&mut Socket> {
        match &mut self.socket {
            Some(socket) if socket.generation == generation => Some(socket),
            _ => {
                debug!(generation, "Ignoring event from a stale socket");
                None
            }
        }
    }

    fn on_open(&mut self, generation: u64) {
        let Some(socket) = self.current(generation) else {
            return;
        };
        if socket.state != SocketState::Connecting {
            return;
        }
        socket.state = SocketState::Open;
        let outgoing = socket.outgoing.clone();

        info!(generation, "Connection open");
        self.session.send_modify(|state| state.connected = true);

        while let Some(line) = self.preconnect_buffer.pop_front() {
            debug!("ws => {line}");
            if outgoing.send(line).is_err() {
                warn!(generation, "Socket driver gone while flushing buffer");
                break;
            }
        }
    }

    /// Consumes session-level lines; returns everything else split into
    /// task key and report body.
    fn on_message(&mut self, generation: u64, line: &str) -> Option<(TaskKey, String)> {
        self.current(generation)?;
        debug!("ws <= {line}");

        match SessionMessage::classify(line) {
            Ok(SessionMessage::LoginResult { success }) => {
                self.logging_in = false;
                let identity = if success {
                    self.credentials.as_ref().map(|c| c.identity.clone())
                } else {
                    None
                };
                match &identity {
                    Some(identity) => info!(identity = %identity, "Logged in"),
                    None => warn!("Login rejected"),
                }
                self.session
                    .send_modify(|state| state.logged_in_identity = identity);
                None
            }
            Ok(SessionMessage::FallbackEnabled { enabled }) => {
                self.session
                    .send_modify(|state| state.fallback_enabled = enabled);
                None
            }
            Ok(SessionMessage::Banner) => {
                debug!("Server banner received");
                None
            }
            Ok(SessionMessage::Task { task_key, body }) => Some((task_key, body)),
            Err(e) => {
                warn!(error = %e, "Dropping line");
                None
            }
        }
    }

    /// Returns true when the current socket closed and a reconnect is due.
    fn on_close(&mut self, generation: u64) -> bool {
        let Some(socket) = self.current(generation) else {
            return false;
        };
        if socket.state == SocketState::Closed {
            return false;
        }
        socket.state = SocketState::Closed;

        info!(generation, "Connection closed");
        self.logging_in = false;
        self.session.send_modify(|state| {
            state.connected = false;
            state.logged_in_identity = None;
        });
        true
    }

    /// Drops the current socket, which closes it.
    pub fn shutdown(&mut self) {
        if let Some(socket) = self.socket.take() {
            info!(generation = socket.generation, "Closing connection");
        }
        self.preconnect_buffer.clear();
        self.session.send_modify(|state| {
            state.connected = false;
            state.logged_in_identity = None;
        });
    }
}

impl<D: Dialer> CommandSink for ConnectionManager<D> {
    fn send_command(&mut self, command: &Command) -> Result<(), ConnectionError> {
        self.send(command.to_string())
    }
}

/// What the tracker must do after a socket event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOutcome {
    Handled,
    /// A task report to route through the registry.
    Report { task_key: TaskKey, body: String },
    /// Schedule exactly one reconnect.
    Reconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Keeps the receiving end of every dialed socket.
    #[derive(Default)]
    struct TestDialer {
        sockets: Vec<(u64, mpsc::UnboundedReceiver<String>)>,
    }

    impl Dialer for TestDialer {
        fn dial(
            &mut self,
            generation: u64,
            _events: mpsc::UnboundedSender<SocketEvent>,
        ) -> mpsc::UnboundedSender<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.sockets.push((generation, rx));
            tx
        }
    }

    fn manager(credentials: Option<Credentials>) -> ConnectionManager<TestDialer> {
        let (events, _rx) = mpsc::unbounded_channel();
        ConnectionManager::new(TestDialer::default(), events, "seatwatch", credentials)
    }

    fn credentials() -> Credentials {
        Credentials {
            identity: "user@example.com".to_string(),
            checking_code: "abc123".to_string(),
        }
    }

    fn drain(manager: &mut ConnectionManager<TestDialer>, index: usize) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some((_, rx)) = manager.dialer.sockets.get_mut(index) {
            while let Ok(line) = rx.try_recv() {
                lines.push(line);
            }
        }
        lines
    }

    #[test]
    fn test_send_without_socket_fails() {
        let mut conn = manager(None);
        assert_eq!(conn.send("remove x".to_string()), Err(ConnectionError::Closed));
    }

    #[test]
    fn test_buffers_until_open() {
        let mut conn = manager(None);
        conn.connect();
        conn.send("first".to_string()).unwrap();
        conn.send("second".to_string()).unwrap();
        assert!(drain(&mut conn, 0).is_empty());

        conn.handle_event(SocketEvent::Opened { generation: 1 });
        assert_eq!(drain(&mut conn, 0), vec!["first", "second"]);
        assert!(conn.session_state().connected);

        conn.send("third".to_string()).unwrap();
        assert_eq!(drain(&mut conn, 0), vec!["third"]);
    }

    #[test]
    fn test_connect_is_noop_while_live() {
        let mut conn = manager(None);
        conn.connect();
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 1 });
        conn.connect();
        assert_eq!(conn.dialer.sockets.len(), 1);
        assert_eq!(conn.generation(), Some(1));
    }

    #[test]
    fn test_close_requests_one_reconnect() {
        let mut conn = manager(None);
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 1 });

        assert_eq!(
            conn.handle_event(SocketEvent::Closed { generation: 1 }),
            SocketOutcome::Reconnect
        );
        assert_eq!(
            conn.handle_event(SocketEvent::Closed { generation: 1 }),
            SocketOutcome::Handled
        );
        assert!(!conn.session_state().connected);
        assert_eq!(conn.send("x".to_string()), Err(ConnectionError::Closed));

        conn.connect();
        assert_eq!(conn.generation(), Some(2));
    }

    #[test]
    fn test_stale_generation_ignored() {
        let mut conn = manager(None);
        conn.connect();
        conn.handle_event(SocketEvent::Closed { generation: 1 });
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 2 });

        assert_eq!(
            conn.handle_event(SocketEvent::Closed { generation: 1 }),
            SocketOutcome::Handled
        );
        assert!(conn.is_open());
    }

    #[test]
    fn test_login_on_connect_and_result() {
        let mut conn = manager(Some(credentials()));
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 1 });
        assert_eq!(
            drain(&mut conn, 0),
            vec!["login user@example.com seatwatch abc123"]
        );

        // In flight: no duplicate.
        conn.login();
        assert!(drain(&mut conn, 0).is_empty());

        conn.handle_event(SocketEvent::Message {
            generation: 1,
            line: "login_result success".to_string(),
        });
        assert_eq!(
            conn.session_state().logged_in_identity.as_deref(),
            Some("user@example.com")
        );

        // Authenticated: no login.
        conn.login();
        assert!(drain(&mut conn, 0).is_empty());

        // Close clears identity; next connect logs in again.
        conn.handle_event(SocketEvent::Closed { generation: 1 });
        assert_eq!(conn.session_state().logged_in_identity, None);
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 2 });
        assert_eq!(
            drain(&mut conn, 1),
            vec!["login user@example.com seatwatch abc123"]
        );
    }

    #[test]
    fn test_login_failure() {
        let mut conn = manager(Some(credentials()));
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 1 });
        conn.handle_event(SocketEvent::Message {
            generation: 1,
            line: "login_result failure".to_string(),
        });
        assert_eq!(conn.session_state().logged_in_identity, None);
    }

    #[test]
    fn test_session_lines_consumed() {
        let mut conn = manager(None);
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 1 });

        let outcome = conn.handle_event(SocketEvent::Message {
            generation: 1,
            line: "fallback_enabled yes".to_string(),
        });
        assert_eq!(outcome, SocketOutcome::Handled);
        assert!(conn.session_state().fallback_enabled);

        let outcome = conn.handle_event(SocketEvent::Message {
            generation: 1,
            line: "open_rzd_api".to_string(),
        });
        assert_eq!(outcome, SocketOutcome::Handled);

        let outcome = conn.handle_event(SocketEvent::Message {
            generation: 1,
            line: "list,1,2,3 0.".to_string(),
        });
        assert_eq!(
            outcome,
            SocketOutcome::Report {
                task_key: TaskKey::new("list,1,2,3"),
                body: "0.".to_string(),
            }
        );
    }

    #[test]
    fn test_set_fallback_line() {
        let mut conn = manager(None);
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 1 });
        conn.set_fallback(true).unwrap();
        conn.set_fallback(false).unwrap();
        assert_eq!(drain(&mut conn, 0), vec!["fallback enable", "fallback disable"]);
    }

    #[tokio::test]
    async fn test_session_watch_updates() {
        let mut conn = manager(None);
        let mut session = conn.session();
        conn.connect();
        conn.handle_event(SocketEvent::Opened { generation: 1 });

        session.changed().await.unwrap();
        assert!(session.borrow_and_update().connected);
    }
}
