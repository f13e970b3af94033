//! Output capture and duplication.
//!
//! Each child stream is drained by [`pump`] into a [`FanOutWriter`] whose
//! destinations are the capture buffer alone, the capture buffer plus a
//! mirror, or a caller-supplied sink.

use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::task::BoxedWriter;

const READ_CHUNK: usize = 8_192;

/// Cloneable in-memory byte buffer.
///
/// Clones share the same storage, so a buffer handed to a child's output
/// pump can still be read after the pump task is gone.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&self, bytes: &[u8]) {
        self.inner.lock().extend_from_slice(bytes);
    }

    /// Copy of the bytes written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    /// Bytes written so far as text; invalid UTF-8 is replaced.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.extend(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Sink forwarding every chunk to a fixed, ordered list of destinations.
pub struct FanOutWriter {
    label: &'static str,
    destinations: Vec<BoxedWriter>,
}

impl FanOutWriter {
    /// `label` names the stream in diagnostics, e.g. `"stdout"`.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            destinations: Vec::new(),
        }
    }

    pub fn push(mut self, destination: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.destinations.push(Box::new(destination));
        self
    }

    pub fn push_boxed(mut self, destination: BoxedWriter) -> Self {
        self.destinations.push(destination);
        self
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Write `chunk` to each destination in order.
    ///
    /// A destination that fails is dropped; the rest keep receiving output.
    pub async fn write_chunk(&mut self, chunk: &[u8]) {
        let mut index = 0;
        while index < self.destinations.len() {
            let Some(destination) = self.destinations.get_mut(index) else {
                break;
            };
            let written = match destination.write_all(chunk).await {
                Ok(()) => destination.flush().await,
                Err(err) => Err(err),
            };
            match written {
                Ok(()) => index += 1,
                Err(err) => {
                    tracing::warn!(
                        stream = self.label,
                        error = %err,
                        "dropping failed output destination"
                    );
                    drop(self.destinations.remove(index));
                }
            }
        }
    }
}

/// Drain `reader` into `fanout` until EOF or a read error.
pub async fn pump<R>(mut reader: R, mut fanout: FanOutWriter)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = buf.split().freeze();
                fanout.write_chunk(&chunk).await;
            }
            Err(ref err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!(stream = fanout.label, error = %err, "output stream closed");
                break;
            }
        }
    }
}
