//! Newline-delimited JSON framing over an async byte stream.
//!
//! # Design Decisions
//! - LF and CRLF terminators are both accepted; the terminator is never returned
//! - Records are bounded; an oversized record cannot be resynchronised and is fatal
//! - Every write is flushed before returning, so a response is fully delivered
//!   before the worker waits on the next read

use serde::Serialize;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::error::GatewayError;

const TERMINATOR: u8 = b'\n';

/// Error type for framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A record exceeded the configured size limit.
    #[error("record exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// A response value could not be serialized.
    #[error("encode failure: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<FrameError> for GatewayError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => GatewayError::Transport(e),
            FrameError::TooLarge { .. } => GatewayError::Protocol(err.to_string()),
            FrameError::Encode(e) => GatewayError::Internal(e.to_string()),
        }
    }
}

/// Reads and writes one JSON record per line.
pub struct MessageFramer<R, W> {
    reader: BufReader<R>,
    writer: W,
    max_frame_bytes: usize,
}

impl<R, W> MessageFramer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap a read half and a write half.
    pub fn new(reader: R, writer: W, max_frame_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            max_frame_bytes,
        }
    }

    /// Wait for the next complete record.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly. A final record
    /// without a terminator is still delivered.
    pub async fn read_message(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut line = Vec::new();
        // Room for the record plus a CRLF terminator.
        let limit = self.max_frame_bytes as u64 + 2;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(TERMINATOR, &mut line)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        let terminated = line.last() == Some(&TERMINATOR);
        if terminated {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }

        if line.len() > self.max_frame_bytes || (!terminated && read as u64 == limit) {
            return Err(FrameError::TooLarge {
                limit: self.max_frame_bytes,
            });
        }

        Ok(Some(line))
    }

    /// Serialize `value`, terminate it and flush.
    pub async fn write_message<T>(&mut self, value: &T) -> Result<(), FrameError>
    where
        T: Serialize + ?Sized,
    {
        let mut data = serde_json::to_vec(value)?;
        data.push(TERMINATOR);
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Resolve once the peer has either sent more bytes (`false`) or closed (`true`).
    ///
    /// Buffered bytes are not consumed, so the next `read_message` still sees them.
    pub async fn peer_closed(&mut self) -> Result<bool, FrameError> {
        let buffered = self.reader.fill_buf().await?;
        Ok(buffered.is_empty())
    }
}
