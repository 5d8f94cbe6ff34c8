//! Client configuration.

use std::time::Duration;

/// Default notification buffer size per subscription (messages).
pub const DEFAULT_CHANNEL_RX_MAX: usize = 16;

/// Default inbound queue size between the receive pump and the dispatcher.
pub const DEFAULT_CHANNEL_TX_MAX: usize = 16;

/// Default maximum number of bytes peeked when parsing the routing header.
pub const DEFAULT_HEADER_BYTES_MAX: usize = 512;

/// Default number of random bytes per generated correlation id.
pub const DEFAULT_ID_BYTES: usize = 9;

/// Default receive buffer size per frame (16 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;

/// Default initial capacity for pooled message memory (64 KiB).
pub const DEFAULT_MESSAGE_SIZE: usize = 64 * 1024;

/// Default waiter TTL.
pub const DEFAULT_CACHE_SLIDING_EXPIRATION: Duration = Duration::from_secs(30);

/// Default waiter-cache sweep frequency.
pub const DEFAULT_CACHE_EVICTION_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for a [`Client`](https://docs.rs/graphwire) pipeline.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Notification buffer capacity per persistent listener.
    pub channel_rx_max: usize,
    /// Inbound queue capacity between receive pump and dispatcher.
    pub channel_tx_max: usize,
    /// Maximum bytes peeked for header parsing.
    pub header_bytes_max: usize,
    /// Random bytes per generated correlation id (rendered as lowercase hex).
    pub id_bytes: usize,
    /// Receive buffer size per frame.
    pub block_size: usize,
    /// Initial capacity hint for pooled message memory.
    pub message_size: usize,
    /// Sliding expiration for registered waiters.
    pub cache_sliding_expiration: Duration,
    /// Sweep frequency for the waiter cache.
    pub cache_eviction_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel_rx_max: DEFAULT_CHANNEL_RX_MAX,
            channel_tx_max: DEFAULT_CHANNEL_TX_MAX,
            header_bytes_max: DEFAULT_HEADER_BYTES_MAX,
            id_bytes: DEFAULT_ID_BYTES,
            block_size: DEFAULT_BLOCK_SIZE,
            message_size: DEFAULT_MESSAGE_SIZE,
            cache_sliding_expiration: DEFAULT_CACHE_SLIDING_EXPIRATION,
            cache_eviction_interval: DEFAULT_CACHE_EVICTION_INTERVAL,
        }
    }
}
