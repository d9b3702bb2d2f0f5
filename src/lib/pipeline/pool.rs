//! Bounded pool of reusable decompression buffers.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::bgzf_reader::BGZF_MAX_BLOCK_SIZE;

#[derive(Debug)]
struct PoolState {
    free: Vec<Vec<u8>>,
    allocated: usize,
}

/// A fixed number of block buffers shared between the coordinator and the
/// decompression workers.
///
/// Buffers are allocated on first use, up to `capacity`. When none is free,
/// [`BufferPool::try_acquire`] returns `None` and counts a stall; the caller
/// waits for a [`BufferPool::release`] instead of allocating more.
#[derive(Debug)]
pub struct BufferPool {
    state: Mutex<PoolState>,
    capacity: usize,
    stalls: AtomicU64,
}

impl BufferPool {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool needs at least one buffer");
        Self {
            state: Mutex::new(PoolState { free: Vec::with_capacity(capacity), allocated: 0 }),
            capacity,
            stalls: AtomicU64::new(0),
        }
    }

    /// Take a buffer, or `None` if all are in use.
    pub fn try_acquire(&self) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        if let Some(buffer) = state.free.pop() {
            return Some(buffer);
        }
        if state.allocated < self.capacity {
            state.allocated += 1;
            return Some(Vec::with_capacity(BGZF_MAX_BLOCK_SIZE));
        }
        drop(state);
        self.stalls.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Return a buffer to the pool.
    ///
    /// # Panics
    ///
    /// Panics if more buffers are returned than were handed out.
    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut state = self.state.lock();
        assert!(state.free.len() < state.allocated, "released a buffer the pool never handed out");
        state.free.push(buffer);
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers that could be acquired right now.
    #[must_use]
    pub fn available(&self) -> usize {
        let state = self.state.lock();
        state.free.len() + (self.capacity - state.allocated)
    }

    /// Times an acquire found the pool exhausted.
    #[must_use]
    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }
}
