//! WebSocket socket driver.
//!
//! Each dialed socket runs in its own task and talks to the tracker only
//! through channels: text frames become [`SocketEvent::Message`], lines
//! from the outgoing channel become text frames. A driver always ends by
//! reporting [`SocketEvent::Closed`] for its generation, including when the
//! handshake fails.
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()` or `todo!()` outside tests.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Dialer, SocketEvent};

/// Dials `ws://` sockets with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsDialer {
    url: String,
    cancel_token: CancellationToken,
}

impl WsDialer {
    /// Every socket driver stops when `cancel_token` is cancelled.
    pub fn new(url: impl Into<String>, cancel_token: CancellationToken) -> Self {
        Self {
            url: url.into(),
            cancel_token,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Dialer for WsDialer {
    fn dial(
        &mut self,
        generation: u64,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> mpsc::UnboundedSender<String> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive_socket(
            self.url.clone(),
            generation,
            events,
            outgoing_rx,
            self.cancel_token.child_token(),
        ));
        outgoing_tx
    }
}

async fn drive_socket(
    url: String,
    generation: u64,
    events: mpsc::UnboundedSender<SocketEvent>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    cancel_token: CancellationToken,
) {
    let connect = tokio::select! {
        _ = cancel_token.cancelled() => return,
        connect = connect_async(url.as_str()) => connect,
    };

    let (ws, _) = match connect {
        Ok(value) => value,
        Err(e) => {
            warn!(generation, url = %url, error = %e, "WebSocket connect failed");
            let _ = events.send(SocketEvent::Closed { generation });
            return;
        }
    };

    info!(generation, url = %url, "WebSocket connected");
    let _ = events.send(SocketEvent::Opened { generation });

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!(generation, "Socket driver cancelled");
                let _ = write.send(Message::Close(None)).await;
                return;
            }

            line = outgoing.recv() => match line {
                Some(line) => {
                    if let Err(e) = write.send(Message::Text(line)).await {
                        warn!(generation, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                None => {
                    debug!(generation, "Outgoing channel dropped, closing socket");
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if events
                        .send(SocketEvent::Message { generation, line: text })
                        .is_err()
                    {
                        debug!(generation, "Tracker gone, closing socket");
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(generation, ?frame, "Server closed the socket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(generation, error = %e, "WebSocket read failed");
                    break;
                }
                None => break,
            },
        }
    }

    let _ = events.send(SocketEvent::Closed { generation });
}
