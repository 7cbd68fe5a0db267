//! seatwatch client - reconnecting seat-availability tracking client
//!
//! This crate keeps one logical session with the tracking server and
//! multiplexes every task over it:
//! - `connection` - the session state machine behind the [`Dialer`] seam
//! - `ws` - the tokio-tungstenite socket driver
//! - `task` / `registry` - tasks, their watchers and key resolution
//! - `tracker` - the actor that serializes all of the above
//! - `events` - outcomes published to subscribers
//!
//! # Panic-Free Guarantees
//!
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()` or `todo!()`
//! outside tests.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod registry;
pub mod task;
pub mod tracker;
pub mod ws;

pub use config::{ClientConfig, ConfigError, Credentials};
pub use connection::{CommandSink, ConnectionManager, Dialer, SessionState, SocketEvent};
pub use error::{ConnectionError, Result, TrackerError};
pub use events::{EventBus, TrackerEvent};
pub use registry::TaskRegistry;
pub use task::{Task, TaskOptions, TaskOrigin, TaskVariant, TrainGroup};
pub use tracker::{spawn_tracker, spawn_tracker_with, TrackerHandle};
pub use ws::WsDialer;
