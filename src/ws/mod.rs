//! WebSocket transport

pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use protocol::ServerMsg;

/// Handle for addressing outgoing events to one connection.
///
/// Sends never block: the writer task drains the channel into the socket,
/// and a closed peer just drops the message. The disconnect path does the
/// real cleanup.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    tx: mpsc::UnboundedSender<ServerMsg>,
}

impl ConnectionHandle {
    pub fn new(id: Uuid) -> (Self, mpsc::UnboundedReceiver<ServerMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn send(&self, msg: ServerMsg) {
        if self.tx.send(msg).is_err() {
            debug!(connection_id = %self.id, "Dropping message for closed connection");
        }
    }
}
