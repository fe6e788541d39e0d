//! Wire framing: newline-delimited UTF-8 text lines.
//!
//! Each frame is one line terminated by `\n`. The receiver buffers until a
//! full line is available, so a frame split across reads — or several
//! frames arriving in one read — decodes correctly.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Lines};
use tracing::trace;

use trailtalk_types::ChatMessage;

use crate::error::ProtocolError;

/// Maximum frame length (64 KiB). Prevents unbounded line buffering.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Sends newline-terminated message frames over a write half.
pub struct MessageSender<W> {
    stream: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> MessageSender<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream: BufWriter::new(stream),
        }
    }

    /// Send a message, encoding it as one line.
    pub async fn send(&mut self, msg: &ChatMessage) -> Result<(), ProtocolError> {
        let line = msg.encode();
        if line.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLong {
                len: line.len(),
                max: MAX_FRAME_LEN,
            });
        }

        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;

        trace!(len = line.len(), "sent frame");
        Ok(())
    }
}

/// Receives newline-terminated message frames from a read half.
pub struct MessageReceiver<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> MessageReceiver<R> {
    pub fn new(stream: R) -> Self {
        Self {
            lines: BufReader::new(stream).lines(),
        }
    }

    /// Receive and decode the next message.
    ///
    /// Returns `None` when the stream has been cleanly closed by the peer.
    /// Malformed friend-request frames are dropped and the loop continues.
    pub async fn recv(&mut self) -> Result<Option<ChatMessage>, ProtocolError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };

            if line.len() > MAX_FRAME_LEN {
                return Err(ProtocolError::FrameTooLong {
                    len: line.len(),
                    max: MAX_FRAME_LEN,
                });
            }

            match ChatMessage::decode(&line) {
                Some(msg) => {
                    trace!(len = line.len(), "received frame");
                    return Ok(Some(msg));
                }
                None => trace!(len = line.len(), "dropped malformed frame"),
            }
        }
    }
}
