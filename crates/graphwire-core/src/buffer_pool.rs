//! Buffer pools for frame and message memory.
//!
//! Two pools back the pipeline: a block pool sized for single-frame receive
//! buffers and a message pool sized for whole reassembled messages. Instead
//! of allocating a fresh `Vec<u8>` per frame or per message, buffers are
//! reused through `object-pool` and return automatically on drop.

use object_pool::Pool;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::config::ClientConfig;

/// Number of buffers each pool retains.
const POOL_CAPACITY: usize = 64;

/// A thread-safe pool of reusable byte buffers.
#[derive(Clone)]
pub struct BufferPool {
    pool: Arc<Pool<Vec<u8>>>,
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool whose buffers are pre-allocated to `buffer_size` bytes.
    pub fn new(buffer_size: usize) -> Self {
        let pool = Pool::new(POOL_CAPACITY, move || Vec::with_capacity(buffer_size));
        Self {
            pool: Arc::new(pool),
            buffer_size,
        }
    }

    /// Rent a buffer. It is returned to the pool when dropped.
    ///
    /// The buffer is cleared before hand-out: the pool hands buffers back in
    /// whatever state they were dropped.
    pub fn get(&self) -> PooledBuf {
        let mut reusable = self
            .pool
            .pull_owned(|| Vec::with_capacity(self.buffer_size));
        reusable.clear();
        PooledBuf { inner: reusable }
    }

    /// The configured per-buffer size.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

/// The pipeline's two pools, built from a [`ClientConfig`].
#[derive(Clone)]
pub struct BufferPools {
    /// Per-frame receive scratch, `block_size` bytes.
    pub block: BufferPool,
    /// Whole-message stores, `message_size` initial capacity.
    pub message: BufferPool,
}

impl BufferPools {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            block: BufferPool::new(config.block_size),
            message: BufferPool::new(config.message_size),
        }
    }
}

/// A rented buffer that returns to its pool on drop.
pub struct PooledBuf {
    inner: object_pool::ReusableOwned<Vec<u8>>,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        self.inner.as_slice()
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.inner.len())
            .field("capacity", &self.inner.capacity())
            .finish()
    }
}
