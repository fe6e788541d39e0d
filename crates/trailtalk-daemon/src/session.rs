//! Live peer session: exclusive owner of the connection and its receive loop.

use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use trailtalk_discovery::Peer;
use trailtalk_protocol::{BoxedStream, MessageReceiver, MessageSender, ProtocolError};
use trailtalk_types::ChatMessage;

use crate::daemon::DaemonEvent;

/// A live session with one remote peer.
///
/// Created only by promotion from a successful accept or dial. The read
/// half runs in a spawned receive loop; the write half stays here for
/// `send`. The token distinguishes this session's events from those of a
/// replaced predecessor.
pub struct Session {
    token: u64,
    peer: Peer,
    sender: MessageSender<WriteHalf<BoxedStream>>,
    reader: JoinHandle<()>,
}

impl Session {
    /// Promote a just-established connection into the live session.
    pub(crate) fn promote(
        token: u64,
        peer: Peer,
        stream: BoxedStream,
        events: mpsc::Sender<DaemonEvent>,
    ) -> Self {
        let (read, write) = tokio::io::split(stream);
        let reader = spawn_receive_loop(token, read, events);
        Self {
            token,
            peer,
            sender: MessageSender::new(write),
            reader,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Send one message to the peer.
    pub async fn send(&mut self, msg: &ChatMessage) -> Result<(), ProtocolError> {
        self.sender.send(msg).await
    }

    /// Tear the session down without raising events.
    pub(crate) fn close(self) {
        self.reader.abort();
    }
}

/// Receive loop: decode frames until EOF or error, then report the end
/// exactly once.
fn spawn_receive_loop(
    token: u64,
    read: ReadHalf<BoxedStream>,
    events: mpsc::Sender<DaemonEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut receiver = MessageReceiver::new(read);
        let error = loop {
            match receiver.recv().await {
                Ok(Some(message)) => {
                    if events
                        .send(DaemonEvent::SessionMessage { token, message })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break None,
                Err(e) => break Some(e.to_string()),
            }
        };
        let _ = events.send(DaemonEvent::SessionEnded { token, error }).await;
    })
}
