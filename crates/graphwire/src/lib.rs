//! graphwire: a JSON-RPC-over-WebSocket client for document/graph database
//! servers.
//!
//! Many concurrent request/response and notification exchanges are
//! multiplexed over one full-duplex WebSocket connection, correlated by
//! short hex identifiers embedded in each JSON payload.
//!
//! # Quick start
//!
//! ```ignore
//! use graphwire::{Client, ClientConfig, Request};
//!
//! let transport = graphwire::transport::connect("ws://localhost:8000/rpc").await?;
//! let client = Client::new(ClientConfig::default());
//! client.open(transport).await?;
//!
//! let response = client
//!     .send(Request::with_params("select", vec!["person".into()]))
//!     .await?;
//! println!("{}", response.result);
//!
//! client.close().await?;
//! ```
//!
//! # Concurrency
//!
//! `send` can be called from any number of tasks; each call registers a
//! one-shot waiter keyed by its correlation id, and the dispatcher routes
//! the matching reply as soon as its first frame arrives. Subscription
//! traffic uses persistent listeners via [`Client::subscribe`].
//!
//! # Errors
//!
//! Lifecycle and protocol errors ([`ClientError::NotOpen`],
//! [`ClientError::InvalidResponse`], …) fail the one call that hit them.
//! Transport errors terminate the pipeline: callers observe them on the
//! next `send` or on awaited `close`, and drive the reopen themselves —
//! there is no automatic reconnect.

mod client;

pub use client::{Client, Subscription};

pub use graphwire_core::{
    ClientConfig, ClientError, ErrorInfo, MessageError, Notify, Request, Response,
    TransportError, WsHeader,
};

// Re-exported for custom transports.
pub use graphwire_core::{FrameSink, FrameSource, InboundFrame, Transport};

/// Transport implementations.
pub mod transport {
    #[cfg(feature = "websocket")]
    pub use graphwire_transport_websocket::{WsSink, WsSource, WsTransport, connect, pair};
}
