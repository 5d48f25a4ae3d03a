//! Detection queue
//!
//! Bounded FIFO between the ingestion thread (single producer) and the
//! detection worker (single consumer). A push into a full queue evicts the
//! oldest pending sequence instead of blocking ingestion; pop waits
//! asynchronously until a sequence is available or the queue is closed.

use super::frame::Sequence;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::debug;

pub struct DetectionQueue {
    pending: Mutex<HeapRb<Sequence>>,
    available: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl DetectionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(HeapRb::new(capacity.max(1))),
            available: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a completed sequence, never blocking
    ///
    /// Returns `true` when the oldest pending sequence was dropped to make room.
    pub fn push(&self, sequence: Sequence) -> bool {
        let evicted = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.push_overwrite(sequence)
        };
        self.available.notify_one();

        if evicted.is_some() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Detection queue full, dropped oldest sequence ({} total)", total);
            true
        } else {
            false
        }
    }

    /// Dequeue the oldest pending sequence without waiting
    pub fn try_pop(&self) -> Option<Sequence> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_pop()
    }

    /// Wait for the next sequence
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Sequence> {
        loop {
            let notified = self.available.notified();
            if let Some(sequence) = self.try_pop() {
                return Some(sequence);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Stop accepting waits; a blocked `pop` returns once pending work is drained
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_waiters();
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .capacity()
            .into()
    }

    /// Sequences shed by drop-oldest since startup
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
