//! Outbound delivery classes for one connected client

use tokio::sync::{mpsc, watch};

use super::protocol::{Delivery, ServerMsg};

/// Sending side of a client connection, held by the room.
///
/// Reliable messages queue in order. Unreliable messages share a single
/// latest-wins slot: a snapshot not yet written to the socket is replaced by
/// the next one.
#[derive(Debug, Clone)]
pub struct PlayerConnection {
    reliable_tx: mpsc::UnboundedSender<ServerMsg>,
    unreliable_tx: watch::Sender<Option<ServerMsg>>,
}

/// Receiving side, drained by the socket writer task
#[derive(Debug)]
pub struct ConnectionOutbox {
    pub reliable_rx: mpsc::UnboundedReceiver<ServerMsg>,
    pub unreliable_rx: watch::Receiver<Option<ServerMsg>>,
}

impl PlayerConnection {
    pub fn new() -> (Self, ConnectionOutbox) {
        let (reliable_tx, reliable_rx) = mpsc::unbounded_channel();
        let (unreliable_tx, unreliable_rx) = watch::channel(None);
        (
            Self {
                reliable_tx,
                unreliable_tx,
            },
            ConnectionOutbox {
                reliable_rx,
                unreliable_rx,
            },
        )
    }

    /// Enqueue a message on its delivery class; never blocks
    pub fn send(&self, msg: ServerMsg) {
        match msg.delivery() {
            Delivery::Reliable => {
                // A closed receiver means the socket is gone; the leave
                // reaches the room through the reader side.
                let _ = self.reliable_tx.send(msg);
            }
            Delivery::Unreliable => {
                self.unreliable_tx.send_replace(Some(msg));
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reliable_tx.is_closed()
    }
}
