//! Stream relay — moves a run's events onto the transport.
//!
//! The relay owns the sink for the lifetime of one request. It writes the
//! `Connected` handshake before any engine work starts, then pulls one
//! event at a time, writing each frame before asking for the next. Every
//! exit path closes the sink exactly once.

use ripple_core::error::TransportError;
use ripple_core::stream::StreamEvent;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::encoder::{KEEP_ALIVE_FRAME, encode_frame};
use crate::sink::FrameSink;

/// How a relayed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// `Done` was written.
    Completed,
    /// An `Error` frame was written.
    Failed(String),
    /// The transport went away; nothing further was written.
    Disconnected,
}

pub struct StreamRelay<S: FrameSink> {
    sink: S,
    keep_alive: Option<Duration>,
}

impl<S: FrameSink> StreamRelay<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            keep_alive: None,
        }
    }

    /// Write a keep-alive comment whenever the engine has been silent this long.
    pub fn with_keep_alive(mut self, idle: Duration) -> Self {
        self.keep_alive = Some(idle);
        self
    }

    /// Relay one run.
    ///
    /// `start` runs after the handshake is on the wire and returns the run's
    /// event stream. If it fails, its message becomes the terminal `Error`.
    pub async fn run<F, Fut>(mut self, start: F) -> RelayOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<mpsc::Receiver<StreamEvent>, String>>,
    {
        let outcome = match self.write(&StreamEvent::Connected).await {
            Err(e) => {
                warn!(error = %e, "Handshake write failed");
                RelayOutcome::Disconnected
            }
            Ok(()) => match start().await {
                Ok(events) => self.pump(events).await,
                Err(message) => self.fail(message).await,
            },
        };
        self.close().await;
        outcome
    }

    async fn pump(&mut self, mut events: mpsc::Receiver<StreamEvent>) -> RelayOutcome {
        loop {
            let next = match self.keep_alive {
                Some(idle) => match tokio::time::timeout(idle, events.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        if let Err(e) = self.sink.write_frame(KEEP_ALIVE_FRAME).await {
                            warn!(error = %e, "Keep-alive write failed");
                            return RelayOutcome::Disconnected;
                        }
                        continue;
                    }
                },
                None => events.recv().await,
            };

            let Some(event) = next else {
                // Sender dropped without a terminal event.
                return self.fail("Stream ended before completion".into()).await;
            };

            if let Err(e) = self.write(&event).await {
                warn!(error = %e, tag = event.tag(), "Frame write failed, abandoning stream");
                return RelayOutcome::Disconnected;
            }

            match event {
                StreamEvent::Done => return RelayOutcome::Completed,
                StreamEvent::Error { error } => return RelayOutcome::Failed(error),
                _ => {}
            }
        }
    }

    async fn fail(&mut self, message: String) -> RelayOutcome {
        match self.write(&StreamEvent::error(message.clone())).await {
            Ok(()) => RelayOutcome::Failed(message),
            Err(e) => {
                warn!(error = %e, "Error frame write failed");
                RelayOutcome::Disconnected
            }
        }
    }

    async fn write(&mut self, event: &StreamEvent) -> Result<(), TransportError> {
        self.sink.write_frame(&encode_frame(event)).await
    }

    async fn close(&mut self) {
        match self.sink.close().await {
            Ok(()) => debug!("Stream closed"),
            Err(e) => warn!(error = %e, "Stream close failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;

    async fn events(list: Vec<StreamEvent>) -> Result<mpsc::Receiver<StreamEvent>, String> {
        let (tx, rx) = mpsc::channel(list.len().max(1));
        for event in list {
            tx.send(event).await.map_err(|e| e.to_string())?;
        }
        Ok(rx)
    }

    #[tokio::test]
    async fn frames_follow_emission_order() {
        let sink = RecordingSink::new();
        let outcome = StreamRelay::new(sink.clone())
            .run(|| {
                events(vec![
                    StreamEvent::token("Hel"),
                    StreamEvent::token("lo"),
                    StreamEvent::Done,
                ])
            })
            .await;

        assert_eq!(outcome, RelayOutcome::Completed);
        assert_eq!(
            sink.frames(),
            vec![
                "data: {\"type\":\"connected\"}\n\n",
                "data: {\"type\":\"token\",\"token\":\"Hel\"}\n\n",
                "data: {\"type\":\"token\",\"token\":\"lo\"}\n\n",
                "data: [DONE]\n\n",
            ]
        );
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test]
    async fn connected_is_written_before_start_runs() {
        let sink = RecordingSink::new();
        let observer = sink.clone();
        StreamRelay::new(sink.clone())
            .run(|| async move {
                assert_eq!(observer.frames().len(), 1);
                events(vec![StreamEvent::Done]).await
            })
            .await;
        assert_eq!(sink.frames().len(), 2);
    }

    #[tokio::test]
    async fn error_frame_then_close() {
        let sink = RecordingSink::new();
        let outcome = StreamRelay::new(sink.clone())
            .run(|| events(vec![StreamEvent::error("model down"), StreamEvent::token("late")]))
            .await;

        assert_eq!(outcome, RelayOutcome::Failed("model down".into()));
        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].contains("model down"));
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test]
    async fn failed_start_becomes_error_frame() {
        let sink = RecordingSink::new();
        let outcome = StreamRelay::new(sink.clone())
            .run(|| async { Err::<mpsc::Receiver<StreamEvent>, _>("store unavailable".to_string()) })
            .await;

        assert_eq!(outcome, RelayOutcome::Failed("store unavailable".into()));
        assert_eq!(sink.frames().len(), 2);
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test]
    async fn sender_dropped_without_terminal_is_an_error() {
        let sink = RecordingSink::new();
        let outcome = StreamRelay::new(sink.clone())
            .run(|| events(vec![StreamEvent::token("partial")]))
            .await;

        assert!(matches!(outcome, RelayOutcome::Failed(_)));
        assert_eq!(sink.frames().len(), 3);
    }

    #[tokio::test]
    async fn write_failure_stops_pulling_and_closes_once() {
        let sink = RecordingSink::new().fail_write_at(2);
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(async move {
            let mut sent = 0;
            for i in 0..10 {
                if tx.send(StreamEvent::token(format!("t{i}"))).await.is_err() {
                    break;
                }
                sent += 1;
            }
            sent
        });

        let outcome = StreamRelay::new(sink.clone()).run(|| async { Ok::<_, String>(rx) }).await;
        assert_eq!(outcome, RelayOutcome::Disconnected);
        assert_eq!(sink.frames().len(), 2);
        assert_eq!(sink.close_count(), 1);

        // the producer sees the closed channel well before its tenth send
        let sent = producer.await.unwrap();
        assert!(sent < 10);
    }

    #[tokio::test]
    async fn handshake_failure_skips_start() {
        let sink = RecordingSink::new().fail_write_at(0);
        let started = std::sync::atomic::AtomicBool::new(false);
        let outcome = StreamRelay::new(sink.clone())
            .run(|| {
                started.store(true, std::sync::atomic::Ordering::SeqCst);
                events(vec![StreamEvent::Done])
            })
            .await;
        assert_eq!(outcome, RelayOutcome::Disconnected);
        assert!(!started.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test]
    async fn close_failure_is_swallowed() {
        let sink = RecordingSink::new().fail_close();
        let outcome = StreamRelay::new(sink.clone())
            .run(|| events(vec![StreamEvent::error("boom")]))
            .await;
        assert_eq!(outcome, RelayOutcome::Failed("boom".into()));
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_engine_gets_keep_alives() {
        let sink = RecordingSink::new();
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(35)).await;
            let _ = tx.send(StreamEvent::Done).await;
        });

        StreamRelay::new(sink.clone())
            .with_keep_alive(Duration::from_secs(15))
            .run(|| async { Ok::<_, String>(rx) })
            .await;

        let frames = sink.frames();
        assert_eq!(frames.iter().filter(|f| *f == KEEP_ALIVE_FRAME).count(), 2);
        assert_eq!(frames.last().map(String::as_str), Some("data: [DONE]\n\n"));
    }
}
