//! Shared helpers for tracker integration tests.
//!
//! `FakeDialer` hands every dialed socket to the test as a `FakeSocket`,
//! which plays the server side: it opens, pushes lines, closes and reads
//! what the tracker sent.

#![allow(dead_code)]

use std::time::Duration;

use seatwatch_client::{ClientConfig, Credentials, Dialer, SocketEvent, TrackerEvent};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(30);
pub const QUIET: Duration = Duration::from_millis(100);

pub const LIST_KEY: &str = "list,2000000,2060150,31.12.2019";
pub const WATCHER_KEY: &str = "train_num=258А&dep_time=13:45&seat_type=Купе";

// ============================================================================
// Fake Dialer
// ============================================================================

pub struct FakeDialer {
    sockets: mpsc::UnboundedSender<FakeSocket>,
}

impl FakeDialer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeSocket>) {
        let (sockets, rx) = mpsc::unbounded_channel();
        (Self { sockets }, rx)
    }
}

impl Dialer for FakeDialer {
    fn dial(
        &mut self,
        generation: u64,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> mpsc::UnboundedSender<String> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let _ = self.sockets.send(FakeSocket {
            generation,
            events,
            outgoing: outgoing_rx,
        });
        outgoing_tx
    }
}

/// Waits for the tracker to dial.
pub async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<FakeSocket>) -> FakeSocket {
    timeout(WAIT, sockets.recv())
        .await
        .expect("timed out waiting for a dial")
        .expect("dialer dropped")
}

/// Asserts the tracker does not dial within `QUIET`.
pub async fn assert_no_dial(sockets: &mut mpsc::UnboundedReceiver<FakeSocket>) {
    if let Ok(Some(socket)) = timeout(QUIET, sockets.recv()).await {
        panic!("unexpected dial of generation {}", socket.generation);
    }
}

// ============================================================================
// Fake Socket
// ============================================================================

pub struct FakeSocket {
    pub generation: u64,
    events: mpsc::UnboundedSender<SocketEvent>,
    outgoing: mpsc::UnboundedReceiver<String>,
}

impl FakeSocket {
    pub fn open(&self) {
        self.events
            .send(SocketEvent::Opened {
                generation: self.generation,
            })
            .expect("tracker gone");
    }

    pub fn push(&self, line: impl Into<String>) {
        self.events
            .send(SocketEvent::Message {
                generation: self.generation,
                line: line.into(),
            })
            .expect("tracker gone");
    }

    pub fn close(&self) {
        self.events
            .send(SocketEvent::Closed {
                generation: self.generation,
            })
            .expect("tracker gone");
    }

    /// Next line the tracker wrote to this socket.
    pub async fn next_line(&mut self) -> String {
        timeout(WAIT, self.outgoing.recv())
            .await
            .expect("timed out waiting for a line")
            .expect("socket dropped by tracker")
    }

    /// Asserts nothing is written within `QUIET`.
    pub async fn assert_silent(&mut self) {
        if let Ok(Some(line)) = timeout(QUIET, self.outgoing.recv()).await {
            panic!("unexpected line: {line}");
        }
    }
}

// ============================================================================
// Events and Config
// ============================================================================

/// Skips events until one matches.
pub async fn wait_event<F>(events: &mut broadcast::Receiver<TrackerEvent>, matches: F) -> TrackerEvent
where
    F: Fn(&TrackerEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for an event")
}

pub fn config() -> ClientConfig {
    ClientConfig::default()
}

pub fn config_with_login() -> ClientConfig {
    ClientConfig {
        credentials: Some(credentials()),
        ..ClientConfig::default()
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        identity: "user@example.com".to_string(),
        checking_code: "abc123".to_string(),
    }
}
