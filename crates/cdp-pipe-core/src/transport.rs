//! Null-byte delimited message channel over a pair of raw pipes.
//!
//! The browser reads protocol messages from one pipe and writes replies and
//! events to the other. Every message is terminated by a single `0` byte;
//! there is no length prefix and no escaping.

use crate::error::{PipeError, Result};
use crate::platform::{BoxedPipeReader, BoxedPipeWriter};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Message terminator on the wire.
pub const DELIMITER: u8 = 0;

/// The narrow seam a protocol client drives.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send one complete message.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Read the next complete message.
    async fn read(&self) -> Result<Vec<u8>>;

    /// Release the underlying channel.
    async fn close(&self) -> Result<()>;
}

struct Shared {
    reader: Mutex<Option<BufReader<BoxedPipeReader>>>,
    writer: Mutex<Option<BoxedPipeWriter>>,
    closed: CancellationToken,
}

/// Duplex message channel over one inbound and one outbound pipe.
///
/// Cloning yields another handle to the same pipes, so one task can own the
/// reader loop while others send. Sends are serialized among themselves, as
/// are receives; a send never waits on a receive.
///
/// The first I/O failure in either direction closes the transport, and every
/// later call fails with [`PipeError::TransportClosed`].
#[derive(Clone)]
pub struct PipeTransport {
    shared: Arc<Shared>,
}

impl PipeTransport {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_boxed(Box::new(reader), Box::new(writer))
    }

    pub fn from_boxed(reader: BoxedPipeReader, writer: BoxedPipeWriter) -> Self {
        Self {
            shared: Arc::new(Shared {
                reader: Mutex::new(Some(BufReader::new(reader))),
                writer: Mutex::new(Some(writer)),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Write `payload` followed by the delimiter as one frame.
    ///
    /// `payload` must not contain a `0` byte.
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        frame.push(DELIMITER);

        let written = {
            let mut writer = self.shared.writer.lock().await;
            let Some(out) = writer.as_mut() else {
                return Err(PipeError::TransportClosed);
            };

            tokio::select! {
                biased;
                _ = self.shared.closed.cancelled() => return Err(PipeError::TransportClosed),
                written = write_frame(out, &frame) => written,
            }
        };

        if let Err(e) = written {
            warn!(error = %e, "Pipe write failed, closing transport");
            let _ = self.close().await;
            return Err(PipeError::Transport(e));
        }

        trace!(len = payload.len(), "Sent frame");
        Ok(())
    }

    /// Read up to the next delimiter and return the bytes before it.
    ///
    /// A stream that ends mid-frame closes the transport; the incomplete
    /// tail is dropped.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        let mut frame = Vec::new();

        let read = {
            let mut reader = self.shared.reader.lock().await;
            let Some(input) = reader.as_mut() else {
                return Err(PipeError::TransportClosed);
            };

            tokio::select! {
                biased;
                _ = self.shared.closed.cancelled() => return Err(PipeError::TransportClosed),
                read = input.read_until(DELIMITER, &mut frame) => read,
            }
        };

        match read {
            Ok(_) if frame.last() == Some(&DELIMITER) => {
                frame.pop();
                trace!(len = frame.len(), "Received frame");
                Ok(frame)
            }
            Ok(_) => {
                let discarded = frame.len();
                warn!(discarded, "Pipe reached end of stream mid-frame, closing transport");
                let _ = self.close().await;
                Err(PipeError::UnexpectedEof { discarded })
            }
            Err(e) => {
                warn!(error = %e, "Pipe read failed, closing transport");
                let _ = self.close().await;
                Err(PipeError::Transport(e))
            }
        }
    }

    /// Close both pipe ends.
    ///
    /// Both ends are always released; the first error met is returned.
    /// Closing an already closed transport succeeds.
    pub async fn close(&self) -> Result<()> {
        // Wake any in-flight send/receive so it drops its lock.
        self.shared.closed.cancel();

        let reader = self.shared.reader.lock().await.take();
        let writer = self.shared.writer.lock().await.take();

        if reader.is_none() && writer.is_none() {
            return Ok(());
        }

        drop(reader);

        let mut first_error = None;
        if let Some(mut out) = writer {
            if let Err(e) = out.shutdown().await {
                first_error.get_or_insert(e);
            }
        }

        debug!("Closed pipe transport");
        match first_error {
            Some(e) => Err(PipeError::Transport(e)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeTransport")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn write_frame(out: &mut BoxedPipeWriter, frame: &[u8]) -> std::io::Result<()> {
    out.write_all(frame).await?;
    out.flush().await
}

#[async_trait]
impl MessageTransport for PipeTransport {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        PipeTransport::send(self, payload).await
    }

    async fn read(&self) -> Result<Vec<u8>> {
        self.receive().await
    }

    async fn close(&self) -> Result<()> {
        PipeTransport::close(self).await
    }
}
