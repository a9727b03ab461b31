//! Scratch buffers for the encode pipeline
//!
//! Each exported group is marshaled into a scratch `BytesMut` before it is
//! compressed and framed. Buffers come from a lock-free queue and go back
//! after the unit is built, so steady-state exports do not allocate scratch
//! space.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

/// Default number of pooled buffers
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Default capacity of each pooled buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Buffers larger than this are dropped instead of pooled
const MAX_POOLED_CAPACITY: usize = 8 * 1024 * 1024;

/// Lock-free pool of reusable `BytesMut` buffers
///
/// When the queue is empty a fresh buffer is allocated; returned buffers
/// beyond the queue capacity are dropped.
pub struct BufferPool {
    queue: ArrayQueue<BytesMut>,
    buffer_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BufferPool {
    /// Create a pool with `pool_size` pre-allocated buffers
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        let queue = ArrayQueue::new(pool_size.max(1));
        for _ in 0..queue.capacity() {
            let _ = queue.push(BytesMut::with_capacity(buffer_capacity));
        }

        Self {
            queue,
            buffer_capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Take a cleared buffer
    #[inline]
    pub fn get(&self) -> BytesMut {
        match self.queue.pop() {
            Some(buf) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.buffer_capacity)
            }
        }
    }

    /// Return a buffer for reuse
    ///
    /// Buffers that shrank below the pool capacity (after `split`) or grew
    /// past the pooling limit are dropped.
    #[inline]
    pub fn put(&self, mut buf: BytesMut) {
        let capacity = buf.capacity();
        if capacity < self.buffer_capacity || capacity > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let _ = self.queue.push(buf);
    }

    /// Buffers currently waiting in the queue
    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Fraction of `get` calls served from the queue
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            1.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_BUFFER_CAPACITY)
    }
}
