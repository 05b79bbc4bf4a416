//! Bounded staging buffer pool.
//!
//! Compression and encryption stage their output through buffers drawn
//! from this pool, which caps how many transformations can be in flight at
//! once. Exhaustion is backpressure, not an error: the acquiring writer
//! blocks, and the stall is reported through the same allocation-wait
//! metric as segment unavailability — both mean "a writer cannot make
//! progress yet".

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::metrics::CommitLogMetrics;

/// Bounded pool of reusable staging buffers.
pub struct BufferPool {
    state: Mutex<PoolState>,
    available: Condvar,
    buffer_capacity: usize,
    metrics: Arc<CommitLogMetrics>,
}

struct PoolState {
    /// Buffers returned and ready for reuse.
    free: Vec<Vec<u8>>,
    /// Buffers currently leased out.
    outstanding: usize,
    /// Hard cap on outstanding + free.
    max_buffers: usize,
    /// Writers currently blocked in `acquire`.
    waiters: usize,
}

impl BufferPool {
    /// Create a pool of at most `max_buffers` buffers, each starting at
    /// `buffer_capacity` bytes.
    pub fn new(
        max_buffers: usize,
        buffer_capacity: usize,
        metrics: Arc<CommitLogMetrics>,
    ) -> Self {
        BufferPool {
            state: Mutex::new(PoolState {
                free: Vec::with_capacity(max_buffers),
                outstanding: 0,
                max_buffers,
                waiters: 0,
            }),
            available: Condvar::new(),
            buffer_capacity,
            metrics,
        }
    }

    /// Check out a buffer, blocking while the pool is exhausted.
    ///
    /// The first writer to block opens a stall episode; later writers that
    /// pile onto the same exhaustion are counted into that episode rather
    /// than incrementing it again. The lease returns its buffer on drop,
    /// on every exit path.
    pub fn acquire(&self) -> BufferLease<'_> {
        let mut state = self.state.lock();

        if state.free.is_empty() && state.outstanding >= state.max_buffers {
            let opens_episode = state.waiters == 0;
            state.waiters += 1;
            let blocked_at = Instant::now();

            while state.free.is_empty() && state.outstanding >= state.max_buffers {
                self.available.wait(&mut state);
            }

            state.waiters -= 1;
            if opens_episode {
                self.metrics.record_allocation_stall(blocked_at.elapsed());
            }
        }

        let buf = match state.free.pop() {
            Some(buf) => buf,
            None => Vec::with_capacity(self.buffer_capacity),
        };
        state.outstanding += 1;

        BufferLease {
            pool: self,
            buf: Some(buf),
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        // A chunk larger than the staging capacity grows the buffer; give
        // the excess back rather than pinning it in the pool.
        if buf.capacity() > self.buffer_capacity {
            buf.shrink_to(self.buffer_capacity);
        }

        let mut state = self.state.lock();
        state.outstanding -= 1;
        state.free.push(buf);
        drop(state);
        self.available.notify_one();
    }

    /// Number of buffers currently leased out.
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferPool")
            .field("max_buffers", &state.max_buffers)
            .field("outstanding", &state.outstanding)
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}

/// RAII lease of one pool buffer.
///
/// Dereferences to the underlying `Vec<u8>`; the buffer is returned to the
/// pool when the lease is dropped.
pub struct BufferLease<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl std::ops::Deref for BufferLease<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer present until drop")
    }
}

impl std::ops::DerefMut for BufferLease<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer present until drop")
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
