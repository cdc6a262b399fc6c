//! Transport sinks for encoded frames.

use async_trait::async_trait;
use ripple_core::error::TransportError;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Where the relay writes frames.
///
/// A write must complete before the relay pulls the next event, so an
/// implementation that awaits its transport gives end-to-end backpressure.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Release the transport. Called exactly once by the relay.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Sink feeding a bounded channel, typically the body of an HTTP response.
///
/// Closing drops the sender, which ends the receiving stream.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<String>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink plus the receiving half, with room for `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn write_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::WriteFailed("sink already closed".into()))?;
        tx.send(frame.to_owned())
            .await
            .map_err(|_| TransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.tx.take() {
            Some(_) => Ok(()),
            None => Err(TransportError::CloseFailed("sink already closed".into())),
        }
    }
}

#[derive(Default)]
struct Recorded {
    frames: Vec<String>,
    writes: usize,
    closes: usize,
    fail_write_at: Option<usize>,
    fail_close: bool,
}

/// In-memory sink that records frames and can be told to fail.
///
/// Clones share the same record, so a test can keep one handle while the
/// relay owns another.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the write with this zero-based index and every write after it.
    pub fn fail_write_at(self, index: usize) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_write_at = Some(index);
        }
        self
    }

    pub fn fail_close(self) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_close = true;
        }
        self
    }

    /// Frames written successfully, in order.
    pub fn frames(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|i| i.frames.clone())
            .unwrap_or_default()
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().map(|i| i.closes).unwrap_or_default()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn write_frame(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        let index = inner.writes;
        inner.writes += 1;
        if inner.closes > 0 {
            return Err(TransportError::WriteFailed("write after close".into()));
        }
        if inner.fail_write_at.is_some_and(|at| index >= at) {
            return Err(TransportError::Disconnected);
        }
        inner.frames.push(frame.to_owned());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| TransportError::CloseFailed(e.to_string()))?;
        inner.closes += 1;
        if inner.fail_close {
            return Err(TransportError::CloseFailed("simulated close failure".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_delivers_then_ends() {
        let (mut sink, mut rx) = ChannelSink::channel(4);
        sink.write_frame("data: a\n\n").await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("data: a\n\n"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn channel_sink_reports_disconnect() {
        let (mut sink, rx) = ChannelSink::channel(1);
        drop(rx);
        let err = sink.write_frame("data: a\n\n").await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[tokio::test]
    async fn channel_sink_rejects_use_after_close() {
        let (mut sink, _rx) = ChannelSink::channel(1);
        sink.close().await.unwrap();
        assert!(sink.write_frame("x").await.is_err());
        assert!(sink.close().await.is_err());
    }

    #[tokio::test]
    async fn recording_sink_fails_on_request() {
        let handle = RecordingSink::new().fail_write_at(1);
        let mut sink = handle.clone();
        sink.write_frame("one").await.unwrap();
        assert!(sink.write_frame("two").await.is_err());
        assert_eq!(handle.frames(), vec!["one"]);
    }
}
