//! The transport's send side.
//!
//! No queue and no background task: serialization happens on the caller's
//! task, and the sink mutex enforces the WebSocket's single-writer
//! invariant for the duration of each send.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::error::{ClientError, TransportError};
use crate::transport::FrameSink;

/// Send half of the pipeline; cheap to clone.
pub struct Outbound<S> {
    sink: Arc<AsyncMutex<Option<S>>>,
}

impl<S> Clone for Outbound<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S> Default for Outbound<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Outbound<S> {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(AsyncMutex::new(None)),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.sink.lock().await.is_some()
    }
}

impl<S: FrameSink> Outbound<S> {
    /// Take ownership of the sink. Idempotent: a second open while already
    /// open keeps the existing sink.
    pub async fn open(&self, sink: S) {
        let mut slot = self.sink.lock().await;
        if slot.is_some() {
            tracing::debug!("outbound already open; ignoring duplicate open");
            return;
        }
        *slot = Some(sink);
    }

    /// Perform the close handshake and drop the sink. Idempotent; close
    /// failures on an already-dying connection are logged, not surfaced.
    pub async fn close(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match sink.close().await {
                Ok(()) | Err(TransportError::Closed) => {}
                Err(e) => tracing::debug!(error = %e, "close handshake failed"),
            }
        }
    }

    /// Write `payload` as one complete text message.
    pub async fn send(&self, payload: &[u8]) -> Result<(), ClientError> {
        let mut slot = self.sink.lock().await;
        let sink = slot.as_mut().ok_or(ClientError::NotOpen)?;
        sink.send(payload).await.map_err(ClientError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Vec<u8>>,
        closes: Arc<AtomicUsize>,
    }

    impl FrameSink for RecordingSink {
        async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
            self.sent.push(payload.to_vec());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_before_open_fails() {
        let outbound: Outbound<RecordingSink> = Outbound::new();
        assert!(matches!(
            outbound.send(b"x").await,
            Err(ClientError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn open_close_are_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let outbound = Outbound::new();
        outbound
            .open(RecordingSink {
                closes: Arc::clone(&closes),
                ..RecordingSink::default()
            })
            .await;
        outbound.open(RecordingSink::default()).await;
        assert!(outbound.is_open().await);

        outbound.close().await;
        outbound.close().await;
        assert!(!outbound.is_open().await);
        assert_eq!(closes.load(Ordering::SeqCst), 1, "only the live sink closes");
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let outbound = Outbound::new();
        outbound.open(RecordingSink::default()).await;
        outbound.close().await;
        assert!(matches!(
            outbound.send(b"x").await,
            Err(ClientError::NotOpen)
        ));
    }
}
