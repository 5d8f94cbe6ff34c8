//! Registered consumers for inbound messages.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::header::WsHeader;
use crate::message::MessageReader;

/// A message handed from the dispatcher to a waiter: the peeked routing
/// header plus the (possibly still streaming) reader.
#[derive(Debug)]
pub struct Dispatched {
    pub header: WsHeader,
    pub reader: MessageReader,
}

/// A registered consumer for inbound messages with a given correlation id.
///
/// At most one waiter per id exists at a time. A non-persistent waiter is
/// removed after its first dispatch; a persistent one stays registered and
/// receives every matching message in transport order.
#[derive(Clone)]
pub struct Waiter {
    id: String,
    persistent: bool,
    tx: mpsc::Sender<Dispatched>,
    cancel: CancellationToken,
}

impl Waiter {
    /// One-shot waiter for a single response.
    pub fn one_shot(id: impl Into<String>) -> (Self, WaiterRx) {
        Self::with_capacity(id, false, 1)
    }

    /// Persistent waiter for subscription-style traffic, buffering up to
    /// `capacity` undelivered messages.
    pub fn persistent(id: impl Into<String>, capacity: usize) -> (Self, WaiterRx) {
        Self::with_capacity(id, true, capacity.max(1))
    }

    fn with_capacity(id: impl Into<String>, persistent: bool, capacity: usize) -> (Self, WaiterRx) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let waiter = Self {
            id: id.into(),
            persistent,
            tx,
            cancel: cancel.clone(),
        };
        (waiter, WaiterRx { rx, cancel })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Release hook: wakes the consumer with cancellation. Invoked on
    /// explicit unregister, TTL eviction, and pipeline teardown; idempotent.
    pub fn release(&self) {
        self.cancel.cancel();
    }

    /// Deliver a message, backing off if the consumer's buffer is full.
    /// Gives the message back if the consumer is gone or cancelled.
    pub(crate) async fn deliver(&self, msg: Dispatched) -> Result<(), Dispatched> {
        tokio::select! {
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(msg);
                    Ok(())
                }
                Err(_) => Err(msg),
            },
            _ = self.cancel.cancelled() => Err(msg),
        }
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("id", &self.id)
            .field("persistent", &self.persistent)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The consuming side of a waiter, held by the caller of `send` or by a
/// subscription.
pub struct WaiterRx {
    rx: mpsc::Receiver<Dispatched>,
    cancel: CancellationToken,
}

impl WaiterRx {
    /// Receive the next dispatched message. Returns `None` once the waiter
    /// has been released (unregistered, evicted, or pipeline teardown) and
    /// no delivered message remains. Messages delivered before a release
    /// win over it.
    pub async fn recv(&mut self) -> Option<Dispatched> {
        tokio::select! {
            biased;
            msg = self.rx.recv() => msg,
            _ = self.cancel.cancelled() => self.rx.try_recv().ok(),
        }
    }
}
