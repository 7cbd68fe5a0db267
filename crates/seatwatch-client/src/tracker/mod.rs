//! Tracker using the actor pattern.
//!
//! The tracker is the single owner of the connection and of every task.
//! Application calls arrive as commands over an mpsc channel; socket
//! drivers report over an unbounded channel; outcomes go out on the event
//! bus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  TrackerCommand  ┌─────────────────┐  TrackerEvent  ┌─────────────┐
//! │  TrackerHandle  │─────────────────▶│  TrackerActor   │───────────────▶│  EventBus   │
//! └─────────────────┘   (mpsc)         └────────┬────────┘  (broadcast)   └─────────────┘
//!                                               │  ▲
//!                                   lines       │  │  SocketEvent
//!                                               ▼  │
//!                                      ┌─────────────────┐
//!                                      │  socket driver  │ (one per generation)
//!                                      └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod actor;
mod commands;
mod engine;
mod handle;

pub use actor::TrackerActor;
pub use commands::TrackerCommand;
pub use engine::{Tracker, REASON_USER};
pub use handle::TrackerHandle;

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, Dialer};
use crate::events::{EventBus, EVENT_BUFFER};
use crate::ws::WsDialer;

/// Channel buffer size for tracker commands.
const COMMAND_BUFFER: usize = 100;

/// Spawns a tracker talking WebSocket to `config.ws_url()`.
///
/// The first socket is dialed immediately. Cancelling `cancel_token` stops
/// the actor and closes every socket.
///
/// # Example
///
/// ```no_run
/// use seatwatch_client::{spawn_tracker, ClientConfig};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let config = ClientConfig::default();
///     let handle = spawn_tracker(&config, CancellationToken::new());
///     let mut events = handle.subscribe();
///     while let Ok(event) = events.recv().await {
///         println!("{event:?}");
///     }
/// }
/// ```
pub fn spawn_tracker(config: &ClientConfig, cancel_token: CancellationToken) -> TrackerHandle {
    let dialer = WsDialer::new(config.ws_url(), cancel_token.clone());
    spawn_tracker_with(dialer, config, cancel_token)
}

/// Spawns a tracker on a custom [`Dialer`].
pub fn spawn_tracker_with<D: Dialer>(
    dialer: D,
    config: &ClientConfig,
    cancel_token: CancellationToken,
) -> TrackerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (socket_tx, socket_rx) = mpsc::unbounded_channel();
    let bus = EventBus::new(EVENT_BUFFER);

    let connection = ConnectionManager::new(
        dialer,
        socket_tx,
        config.client_name.clone(),
        config.credentials.clone(),
    );
    let session = connection.session();
    let tracker = Tracker::new(connection, bus.clone());

    let actor = TrackerActor::new(
        tracker,
        cmd_rx,
        socket_rx,
        config.reconnect_delay(),
        cancel_token,
    );
    tokio::spawn(actor.run());

    TrackerHandle::new(cmd_tx, bus, session)
}
