//! The client façade.
//!
//! Wires the pipeline together and owns the request/response flow: id
//! allocation, waiter registration, serialization through the send side,
//! and decoding of the dispatched reply.

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use graphwire_core::{
    BufferPools, ClientConfig, ClientError, Dispatcher, Inbound, Notify, Outbound, Request,
    Response, Transport, Waiter, WaiterRx, generate_id,
};

/// A JSON-RPC-over-WebSocket client.
///
/// One `Client` multiplexes any number of concurrent [`send`](Client::send)
/// calls and [`subscribe`](Client::subscribe) streams over a single
/// connection. `open` takes a connected transport; after a transport
/// failure, callers `close` and `open` again with a fresh one.
pub struct Client<T: Transport> {
    config: ClientConfig,
    pipeline: AsyncMutex<Option<Pipeline<T::Sink>>>,
}

struct Pipeline<S> {
    outbound: Outbound<S>,
    inbound: Inbound,
    dispatcher: Dispatcher,
    pools: BufferPools,
}

impl<T: Transport> Client<T> {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            pipeline: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the pipeline over a connected transport.
    pub async fn open(&self, transport: T) -> Result<(), ClientError> {
        let mut slot = self.pipeline.lock().await;
        if slot.is_some() {
            return Err(ClientError::AlreadyOpen);
        }

        let (sink, source) = transport.split();
        let pools = BufferPools::new(&self.config);
        let (queue_tx, queue_rx) = mpsc::channel(self.config.channel_tx_max);

        let outbound = Outbound::new();
        outbound.open(sink).await;

        let inbound = Inbound::new();
        inbound.open(source, queue_tx, pools.clone()).await?;

        let dispatcher = Dispatcher::new(&self.config);
        dispatcher.open(queue_rx).await?;

        *slot = Some(Pipeline {
            outbound,
            inbound,
            dispatcher,
            pools,
        });
        tracing::debug!("pipeline open");
        Ok(())
    }

    /// Tear the pipeline down: stop reading, stop dispatching (pending
    /// calls observe [`ClientError::Canceled`]), then perform the close
    /// handshake. Idempotent. Surfaces a transport failure the receive
    /// pump died with, if any.
    pub async fn close(&self) -> Result<(), ClientError> {
        let pipeline = self.pipeline.lock().await.take();
        let Some(p) = pipeline else {
            return Ok(());
        };
        let inbound_result = p.inbound.close().await;
        let dispatch_result = p.dispatcher.close().await;
        p.outbound.close().await;
        tracing::debug!("pipeline closed");
        inbound_result.and(dispatch_result)
    }

    pub async fn is_open(&self) -> bool {
        self.pipeline.lock().await.is_some()
    }

    /// Send a request and await its response.
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.send_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Send a request and await its response, subject to the caller's
    /// cancellation signal. On cancellation the waiter is removed and a
    /// late-arriving reply for this id is discarded.
    pub async fn send_with_cancel(
        &self,
        mut request: Request,
        cancel: CancellationToken,
    ) -> Result<Response, ClientError> {
        let (outbound, dispatcher, pools) = {
            let guard = self.pipeline.lock().await;
            let Some(p) = guard.as_ref() else {
                return Err(ClientError::NotOpen);
            };
            (p.outbound.clone(), p.dispatcher.clone(), p.pools.clone())
        };

        if request.id.is_empty() {
            request.id = generate_id(self.config.id_bytes);
        }

        let (waiter, mut rx) = Waiter::one_shot(request.id.clone());
        if !dispatcher.register(waiter) {
            tracing::debug!(id = %request.id, "correlation id collision");
            return Ok(Response::default());
        }
        let mut unregister = UnregisterGuard {
            dispatcher: dispatcher.clone(),
            id: request.id.clone(),
            armed: true,
        };

        {
            let mut buf = pools.message.get();
            serde_json::to_writer(&mut *buf, &request)?;
            outbound.send(&buf).await?;
        }
        tracing::debug!(id = %request.id, method = %request.method, "request sent");

        let msg = tokio::select! {
            biased;
            msg = rx.recv() => msg.ok_or(ClientError::Canceled)?,
            _ = cancel.cancelled() => return Err(ClientError::Canceled),
        };
        // Dispatch already removed the one-shot waiter.
        unregister.armed = false;

        if msg.header.is_empty() {
            msg.reader.close();
            return Err(ClientError::InvalidResponse);
        }
        if msg.header.is_notify() {
            msg.reader.close();
            return Err(ClientError::ExpectedResponseGotNotify);
        }

        let decoded = tokio::select! {
            biased;
            res = decode_response(&msg) => res,
            _ = cancel.cancelled() => Err(ClientError::Canceled),
        };
        msg.reader.close();

        let mut response = decoded?;
        if response.id.is_empty() {
            response.id = msg.header.id.clone().unwrap_or_default();
        }
        Ok(response)
    }

    /// Register a persistent listener for notification traffic on `id`
    /// (subscription-style methods).
    pub async fn subscribe(&self, id: impl Into<String>) -> Result<Subscription, ClientError> {
        let dispatcher = {
            let guard = self.pipeline.lock().await;
            let Some(p) = guard.as_ref() else {
                return Err(ClientError::NotOpen);
            };
            p.dispatcher.clone()
        };

        let id = id.into();
        let (waiter, rx) = Waiter::persistent(id.clone(), self.config.channel_rx_max);
        if !dispatcher.register(waiter) {
            return Err(ClientError::DuplicateCorrelationId);
        }
        tracing::debug!(id = %id, "listener registered");
        Ok(Subscription { id, rx, dispatcher })
    }
}

async fn decode_response(msg: &graphwire_core::Dispatched) -> Result<Response, ClientError> {
    msg.reader.complete().await?;
    let value = msg
        .reader
        .with_bytes(|bytes| serde_json::from_slice::<Value>(bytes))?
        .map_err(|_| ClientError::InvalidResponse)?;
    // The peek window can cut a split header before `method`; the full
    // document is authoritative for the shape check.
    if value.get("method").is_some() {
        return Err(ClientError::ExpectedResponseGotNotify);
    }
    serde_json::from_value::<Response>(value).map_err(|_| ClientError::InvalidResponse)
}

struct UnregisterGuard {
    dispatcher: Dispatcher,
    id: String,
    armed: bool,
}

impl Drop for UnregisterGuard {
    fn drop(&mut self) {
        if self.armed {
            self.dispatcher.unregister(&self.id);
        }
    }
}

/// A stream of notifications for one correlation id.
///
/// Dropping the subscription unregisters the listener; messages arriving
/// afterwards are discarded by the dispatcher.
pub struct Subscription {
    id: String,
    rx: WaiterRx,
    dispatcher: Dispatcher,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next notification, in transport order. `None` once the listener has
    /// been released (unsubscribe, eviction, or pipeline teardown).
    pub async fn next(&mut self) -> Option<Result<Notify, ClientError>> {
        let msg = self.rx.recv().await?;
        let result = async {
            msg.reader.complete().await?;
            let notify = msg
                .reader
                .with_bytes(|bytes| serde_json::from_slice::<Notify>(bytes))?
                .map_err(ClientError::Json)?;
            Ok(notify)
        }
        .await;
        msg.reader.close();
        Some(result)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispatcher.unregister(&self.id);
    }
}
