//! Strict block ordering with buffer backpressure.
//!
//! Compressed blocks are dispatched for decompression in block-id order,
//! and only while the [`BufferPool`] has a buffer for them. Decompressed
//! blocks come back in any order and are released downstream strictly in
//! block-id order.
//!
//! ```text
//!  submit ──▶ blocked (min-heap) ──dispatch──▶ workers ──complete──▶ ready (min-heap) ──next_ready──▶
//!                   ▲  needs a buffer                                     releases in id order
//!                   └──────────────── buffer released ◀─────────────────────────────────────┘
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::pool::BufferPool;

struct Keyed<T> {
    id: u64,
    item: T,
}

impl<T> PartialEq for Keyed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Keyed<T> {}

impl<T> PartialOrd for Keyed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Keyed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// Min-heap of items keyed by block id.
struct BlockHeap<T> {
    heap: BinaryHeap<Reverse<Keyed<T>>>,
}

impl<T> BlockHeap<T> {
    fn new() -> Self {
        Self { heap: BinaryHeap::new() }
    }

    fn push(&mut self, id: u64, item: T) {
        self.heap.push(Reverse(Keyed { id, item }));
    }

    fn peek_id(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(k)| k.id)
    }

    fn pop(&mut self) -> Option<(u64, T)> {
        self.heap.pop().map(|Reverse(k)| (k.id, k.item))
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Orders compressed blocks `B` out to workers and decompressed blocks `D`
/// back to the consumer.
pub struct BlockScheduler<B, D> {
    blocked: BlockHeap<B>,
    ready: BlockHeap<D>,
    next_ready: u64,
    dispatched: u64,
}

impl<B, D> Default for BlockScheduler<B, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, D> BlockScheduler<B, D> {
    #[must_use]
    pub fn new() -> Self {
        Self { blocked: BlockHeap::new(), ready: BlockHeap::new(), next_ready: 0, dispatched: 0 }
    }

    /// Queue a compressed block until a buffer is free for it.
    pub fn submit(&mut self, id: u64, block: B) {
        self.blocked.push(id, block);
    }

    /// Pair queued blocks with buffers, lowest id first, stopping at the
    /// first block the pool cannot serve; that block and all later ones stay
    /// queued until a buffer is released.
    pub fn dispatch(&mut self, pool: &BufferPool) -> Vec<(B, Vec<u8>)> {
        let mut out = Vec::new();
        while !self.blocked.is_empty() {
            let Some(buffer) = pool.try_acquire() else {
                break;
            };
            if let Some((_, block)) = self.blocked.pop() {
                out.push((block, buffer));
                self.dispatched += 1;
            }
        }
        out
    }

    /// Record a decompressed block.
    ///
    /// # Panics
    ///
    /// Panics if `id` was already released downstream.
    pub fn complete(&mut self, id: u64, block: D) {
        assert!(id >= self.next_ready, "block {id} completed twice");
        self.ready.push(id, block);
    }

    /// The next block in id order, if it has completed.
    pub fn next_ready(&mut self) -> Option<D> {
        if self.ready.peek_id() != Some(self.next_ready) {
            return None;
        }
        self.next_ready += 1;
        self.ready.pop().map(|(_, block)| block)
    }

    /// Blocks waiting for a buffer.
    #[must_use]
    pub fn blocked(&self) -> usize {
        self.blocked.len()
    }

    /// Completed blocks waiting for an earlier block.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.ready.len()
    }

    /// Blocks handed to workers so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// True when nothing is queued in either direction.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.blocked.is_empty() && self.ready.is_empty()
    }
}
