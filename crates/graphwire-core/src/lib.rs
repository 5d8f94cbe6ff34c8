//! graphwire-core: the duplex message pipeline behind the graphwire client.
//!
//! This crate implements the machinery that multiplexes many concurrent
//! JSON-RPC exchanges over one WebSocket connection:
//!
//! - Message reassembly ([`MessageWriter`]/[`MessageReader`]) over pooled
//!   memory ([`BufferPool`]), with streaming handoff: a reader is published
//!   to the dispatcher as soon as a message's first frame arrives.
//! - Routing-header peeking ([`peek_header`], [`WsHeader`]) from a bounded
//!   payload prefix, without consuming the stream.
//! - Waiter registration and TTL-bounded caching ([`Waiter`], [`TtlCache`])
//!   with sliding expiration and release hooks.
//! - The paired transport tasks: [`Outbound`] (caller-driven send side),
//!   [`Inbound`] (background receive pump), and [`Dispatcher`] (queue drain
//!   and routing).
//!
//! The concrete WebSocket lives behind the [`Transport`] traits; see the
//! `graphwire-transport-websocket` crate. The client façade tying the
//! pieces together lives in the `graphwire` crate.

mod buffer_pool;
mod cache;
mod config;
mod correlation;
mod dispatch;
mod envelope;
mod error;
mod header;
mod inbound;
mod message;
mod outbound;
mod transport;
mod waiter;

pub use buffer_pool::{BufferPool, BufferPools, PooledBuf};
pub use cache::TtlCache;
pub use config::{
    ClientConfig, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_EVICTION_INTERVAL,
    DEFAULT_CACHE_SLIDING_EXPIRATION, DEFAULT_CHANNEL_RX_MAX, DEFAULT_CHANNEL_TX_MAX,
    DEFAULT_HEADER_BYTES_MAX, DEFAULT_ID_BYTES, DEFAULT_MESSAGE_SIZE,
};
pub use correlation::generate_id;
pub use dispatch::Dispatcher;
pub use envelope::{ErrorInfo, Notify, Request, Response};
pub use error::{ClientError, MessageError, TransportError};
pub use header::{WsHeader, peek_header};
pub use inbound::Inbound;
pub use message::{FirstFrame, MessageReader, MessageWriter, channel as message_channel};
pub use outbound::Outbound;
pub use transport::{FrameSink, FrameSource, InboundFrame, Transport};
pub use waiter::{Dispatched, Waiter, WaiterRx};
