//! Queue drain and waiter routing.
//!
//! The dispatcher receives message readers from the receive pump, awaits
//! each reader's first frame, peeks a bounded prefix for the routing
//! header, and hands the message to the matching registered waiter. It
//! exclusively owns the waiter TTL cache; a periodic sweep task evicts
//! abandoned waiters under the same cancellation token as the dispatch
//! loop.
//!
//! Messages with no correlation id, an unknown id, or an unparseable
//! header prefix are dropped silently — they are an error only from the
//! server's standpoint.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::header::peek_header;
use crate::message::{FirstFrame, MessageReader};
use crate::waiter::{Dispatched, Waiter};

struct Running {
    cancel: CancellationToken,
    dispatch: JoinHandle<Result<(), ClientError>>,
    sweeper: JoinHandle<()>,
}

/// Consumer half of the pipeline; cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    cache: TtlCache,
    header_bytes_max: usize,
    eviction_interval: std::time::Duration,
    state: Arc<AsyncMutex<Option<Running>>>,
}

impl Dispatcher {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            cache: TtlCache::new(config.cache_sliding_expiration),
            header_bytes_max: config.header_bytes_max,
            eviction_interval: config.cache_eviction_interval,
            state: Arc::new(AsyncMutex::new(None)),
        }
    }

    /// Register a waiter. Returns false on a correlation-id collision.
    pub fn register(&self, waiter: Waiter) -> bool {
        self.cache.try_add(waiter)
    }

    /// Remove a waiter and invoke its release hook.
    pub fn unregister(&self, id: &str) {
        if self.cache.remove_release(id) {
            tracing::debug!(id, "unregistered waiter");
        }
    }

    /// Number of currently registered waiters.
    pub fn waiter_count(&self) -> usize {
        self.cache.len()
    }

    /// Spawn the dispatch loop and the cache sweeper. Fails with
    /// [`ClientError::AlreadyOpen`] if already running.
    pub async fn open(&self, queue: mpsc::Receiver<MessageReader>) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(ClientError::AlreadyOpen);
        }
        let cancel = CancellationToken::new();
        let dispatch = tokio::spawn(dispatch_task(
            queue,
            self.cache.clone(),
            self.header_bytes_max,
            cancel.clone(),
        ));
        let sweeper = tokio::spawn(sweep_task(
            self.cache.clone(),
            self.eviction_interval,
            cancel.clone(),
        ));
        *state = Some(Running {
            cancel,
            dispatch,
            sweeper,
        });
        Ok(())
    }

    /// Cancel and join both tasks. Cancellation and peer-close outcomes are
    /// swallowed; other failures surface. Remaining waiters are released so
    /// pending calls observe cancellation.
    pub async fn close(&self) -> Result<(), ClientError> {
        let running = self.state.lock().await.take();
        let Some(running) = running else {
            return Ok(());
        };
        running.cancel.cancel();
        let _ = running.sweeper.await;
        match running.dispatch.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(ClientError::Canceled | ClientError::ConnectionClosed)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(join) => {
                tracing::warn!(error = %join, "dispatch task failed to join");
                Ok(())
            }
        }
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

async fn dispatch_task(
    queue: mpsc::Receiver<MessageReader>,
    cache: TtlCache,
    header_bytes_max: usize,
    cancel: CancellationToken,
) -> Result<(), ClientError> {
    let result = dispatch_loop(queue, &cache, header_bytes_max, &cancel).await;
    // Whatever ended the loop, pending calls must not wait out the TTL.
    cache.release_all();
    result
}

async fn dispatch_loop(
    mut queue: mpsc::Receiver<MessageReader>,
    cache: &TtlCache,
    header_bytes_max: usize,
    cancel: &CancellationToken,
) -> Result<(), ClientError> {
    loop {
        let reader = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = queue.recv() => match next {
                Some(reader) => reader,
                None => return Ok(()),
            },
        };

        // The reader was published on the first transport frame; wait until
        // that frame's bytes are actually appended before peeking.
        let first = tokio::select! {
            _ = cancel.cancelled() => {
                reader.close();
                return Ok(());
            }
            f = reader.readable() => f,
        };
        match first {
            Ok(FirstFrame::Data) => {}
            Ok(FirstFrame::RemoteClose) => {
                reader.close();
                return Err(ClientError::ConnectionClosed);
            }
            Err(_) => {
                // Pump died between publish and first append.
                reader.close();
                continue;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = route(reader, cache, header_bytes_max) => {}
        }
    }
}

/// Peek the header and hand the reader to its waiter, or discard it.
async fn route(reader: MessageReader, cache: &TtlCache, header_bytes_max: usize) {
    // The header may straddle frame boundaries: re-peek as the message
    // grows until an id turns up, the peek window is exhausted, or the
    // message ends.
    let header = loop {
        let Ok(len) = reader.len() else {
            return;
        };
        let mut prefix = vec![0u8; header_bytes_max.min(len)];
        let Ok(n) = reader.read_at(0, &mut prefix) else {
            return;
        };
        let header = peek_header(&prefix[..n]);

        if header.id.is_some() || len >= header_bytes_max || reader.is_complete() {
            break header;
        }
        if reader.grown(len).await.is_err() {
            reader.close();
            return;
        }
    };

    let Some(id) = header.id.clone() else {
        tracing::debug!("dropping inbound message without correlation id");
        reader.close();
        return;
    };

    let Some(waiter) = cache.try_get(&id) else {
        tracing::debug!(id = %id, "dropping unclaimed inbound message");
        reader.close();
        return;
    };

    if waiter.is_cancelled() {
        cache.remove_release(&id);
        reader.close();
        return;
    }

    let msg = Dispatched { header, reader };
    match waiter.deliver(msg).await {
        Ok(()) => {
            if !waiter.is_persistent() {
                cache.try_remove(&id);
            }
        }
        Err(msg) => {
            // Consumer cancelled or gone mid-dispatch.
            cache.remove_release(&id);
            msg.reader.close();
        }
    }
}

async fn sweep_task(
    cache: TtlCache,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "waiter cache sweep");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::message::{self, MessageWriter};
    use crate::waiter::Waiter;
    use std::time::Duration;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&ClientConfig::default())
    }

    fn complete_reader(bytes: &[u8]) -> MessageReader {
        let (mut writer, reader) = message::channel(BufferPool::new(1024).get());
        writer.append(bytes, true).unwrap();
        reader
    }

    fn streaming_reader() -> (MessageWriter, MessageReader) {
        message::channel(BufferPool::new(1024).get())
    }

    #[tokio::test]
    async fn dispatches_to_matching_waiter_byte_for_byte() {
        let d = dispatcher();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        let (waiter, mut rx) = Waiter::one_shot("abc");
        assert!(d.register(waiter));

        let payload = br#"{"id":"abc","result":42}"#;
        queue_tx.send(complete_reader(payload)).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.header.id.as_deref(), Some("abc"));
        msg.reader.with_bytes(|b| assert_eq!(b, payload)).unwrap();

        // One-shot waiters vanish after dispatch.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while d.waiter_count() != 0 {
            assert!(tokio::time::Instant::now() < deadline, "waiter not removed");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        d.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_and_malformed_messages_are_dropped() {
        let d = dispatcher();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        queue_tx
            .send(complete_reader(br#"{"id":"nobody","result":1}"#))
            .await
            .unwrap();
        queue_tx.send(complete_reader(b"not json at all")).await.unwrap();
        queue_tx.send(complete_reader(br#"{"result":1}"#)).await.unwrap();

        // The loop survives the drops and still routes to a live waiter.
        let (waiter, mut rx) = Waiter::one_shot("later");
        d.register(waiter);
        queue_tx
            .send(complete_reader(br#"{"id":"later","result":2}"#))
            .await
            .unwrap();
        assert!(rx.recv().await.is_some());
        d.close().await.unwrap();
    }

    #[tokio::test]
    async fn persistent_waiter_receives_in_order_and_stays() {
        let d = dispatcher();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        let (waiter, mut rx) = Waiter::persistent("sub1", 4);
        d.register(waiter);

        for n in 0..3 {
            let payload = format!(r#"{{"id":"sub1","method":"live.update","params":[{n}]}}"#);
            queue_tx
                .send(complete_reader(payload.as_bytes()))
                .await
                .unwrap();
        }

        for n in 0..3 {
            let msg = rx.recv().await.unwrap();
            let expected = format!(r#"{{"id":"sub1","method":"live.update","params":[{n}]}}"#);
            msg.reader
                .with_bytes(|b| assert_eq!(b, expected.as_bytes()))
                .unwrap();
        }
        assert_eq!(d.waiter_count(), 1);
        d.close().await.unwrap();
    }

    #[tokio::test]
    async fn header_split_across_frames_is_located() {
        let d = dispatcher();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        let (waiter, mut rx) = Waiter::one_shot("deadbeef");
        d.register(waiter);

        let (mut writer, reader) = streaming_reader();
        writer.append(br#"{"id":"dead"#, false).unwrap();
        queue_tx.send(reader).await.unwrap();
        tokio::task::yield_now().await;

        writer.append(br#"beef","result":"#, false).unwrap();
        writer.append(br#"[1,2,3]}"#, true).unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.header.id.as_deref(), Some("deadbeef"));
        d.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_waiter_is_unregistered_on_dispatch() {
        let d = dispatcher();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        let (waiter, _rx) = Waiter::one_shot("gone");
        d.register(waiter.clone());
        waiter.release();

        queue_tx
            .send(complete_reader(br#"{"id":"gone","result":0}"#))
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while d.waiter_count() != 0 {
            assert!(tokio::time::Instant::now() < deadline, "waiter not unregistered");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        d.close().await.unwrap();
    }

    #[tokio::test]
    async fn remote_close_releases_pending_waiters() {
        let d = dispatcher();
        let (queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        let (waiter, mut rx) = Waiter::one_shot("pending");
        d.register(waiter);

        let (mut writer, reader) = streaming_reader();
        writer.mark_remote_close();
        queue_tx.send(reader).await.unwrap();

        // The sentinel terminates the loop and pending waiters wake empty.
        assert!(rx.recv().await.is_none());
        assert_eq!(d.waiter_count(), 0);
        d.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_releases_pending_waiters() {
        let d = dispatcher();
        let (_queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        let (waiter, mut rx) = Waiter::one_shot("pending");
        d.register(waiter);

        d.close().await.unwrap();
        assert!(rx.recv().await.is_none());
        assert_eq!(d.waiter_count(), 0);
    }

    #[tokio::test]
    async fn double_open_fails_fast() {
        let d = dispatcher();
        let (_tx1, rx1) = mpsc::channel(8);
        let (_tx2, rx2) = mpsc::channel(8);
        d.open(rx1).await.unwrap();
        assert!(matches!(d.open(rx2).await, Err(ClientError::AlreadyOpen)));
        d.close().await.unwrap();
    }

    #[tokio::test]
    async fn sweeper_evicts_abandoned_waiter_within_window() {
        let d = Dispatcher::new(&ClientConfig {
            cache_sliding_expiration: Duration::from_millis(30),
            cache_eviction_interval: Duration::from_millis(10),
            ..ClientConfig::default()
        });
        let (_queue_tx, queue_rx) = mpsc::channel(8);
        d.open(queue_rx).await.unwrap();

        let (waiter, mut rx) = Waiter::one_shot("abandoned");
        d.register(waiter);

        // Must be gone within sliding_expiration + eviction_interval (plus
        // scheduling slack) and its release hook must have fired.
        assert!(rx.recv().await.is_none());
        assert_eq!(d.waiter_count(), 0);
        d.close().await.unwrap();
    }
}
