//! Clip history ring buffer
//!
//! Fixed-capacity FIFO of recent raw frames. Pushing into a full buffer
//! evicts the oldest frame. Not synchronized: it lives inside the pipeline
//! context mutex together with the overlay counter and live settings.

use super::frame::Frame;
use ringbuf::{traits::*, HeapRb};

pub struct FrameRing {
    buffer: HeapRb<Frame>,
}

impl FrameRing {
    /// Create a ring holding up to `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity.max(1)),
        }
    }

    /// Append a frame, returning the evicted oldest frame if the ring was full
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        self.buffer.push_overwrite(frame)
    }

    pub fn len(&self) -> usize {
        self.buffer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity().into()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    /// Drop every frame, keeping the capacity
    pub fn clear(&mut self) {
        self.buffer = HeapRb::new(self.capacity());
    }

    /// Copy of the current contents, oldest first
    ///
    /// Frames share their image data, so this copies pointers only.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.buffer.iter().cloned().collect()
    }

    /// Full-history snapshot, or `None` while fewer than `capacity` frames are held
    pub fn full_snapshot(&self) -> Option<Vec<Frame>> {
        if self.is_full() {
            Some(self.snapshot())
        } else {
            None
        }
    }

    /// Change capacity, keeping the most recent frames that still fit
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity() {
            return;
        }

        let frames = self.snapshot();
        let mut resized = HeapRb::new(capacity);
        let skip = frames.len().saturating_sub(capacity);
        for frame in frames.into_iter().skip(skip) {
            resized.push_overwrite(frame);
        }
        self.buffer = resized;
    }
}
