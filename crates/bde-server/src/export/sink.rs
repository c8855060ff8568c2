//! Byte sinks for export streams
//!
//! The encoders write through [`ExportSink`] so the same streaming code
//! serves an HTTP response body (via [`ChannelSink`]) and the test suites
//! (via [`BufferSink`]).

use anyhow::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Upper bound on bytes held before a chunk is pushed downstream even
/// without an explicit flush.
const MAX_BUFFERED_BYTES: usize = 32 * 1024;

/// Destination for encoded export bytes.
#[async_trait]
pub trait ExportSink: Send {
    async fn write(&mut self, data: &[u8]) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;
}

/// Sink feeding an HTTP response body through a bounded channel.
///
/// The channel gives natural backpressure: a slow client slows the
/// repository cursor instead of growing a buffer.
pub struct ChannelSink {
    tx: mpsc::Sender<std::io::Result<Bytes>>,
    buf: BytesMut,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<std::io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: BytesMut::new(),
        }
    }

    async fn send_buffered(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| anyhow::anyhow!("export consumer disconnected"))
    }
}

#[async_trait]
impl ExportSink for ChannelSink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= MAX_BUFFERED_BYTES {
            self.send_buffered().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.send_buffered().await
    }
}

/// In-memory sink recording bytes and flushes, for tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub bytes: Vec<u8>,
    pub flushes: usize,
}

#[async_trait]
impl ExportSink for BufferSink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
