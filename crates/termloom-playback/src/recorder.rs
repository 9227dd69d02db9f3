#![forbid(unsafe_code)]

//! Bounded frame recorder.
//!
//! A ring of timestamped screen snapshots, capped at a configured capacity.
//! When full, the oldest slot is overwritten in place rather than
//! reallocated, which keeps high-frequency capture from churning the
//! allocator. Captured screens are deep copies: later mutation of the live
//! screen cannot corrupt a stored frame, and reads copy out a consistent
//! snapshot.

use serde::{Deserialize, Serialize};

use termloom_core::ProcessedUpdate;

/// Default frame capacity (configured range is roughly 75–200).
pub const DEFAULT_FRAME_CAPACITY: usize = 100;

/// A timestamped deep snapshot of one screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Rendered rows at capture time.
    pub screen: Vec<String>,
    /// Capture timestamp in milliseconds.
    pub time_ms: u64,
}

/// Ring buffer of [`Frame`]s with in-place oldest-first eviction.
#[derive(Debug, Clone)]
pub struct FrameRecorder {
    slots: Vec<Frame>,
    start: usize,
    len: usize,
    capacity: usize,
}

impl FrameRecorder {
    /// Create a recorder with the given frame capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            start: 0,
            len: 0,
            capacity,
        }
    }

    /// Capacity in frames.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no frames have been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capture a screen snapshot at the given timestamp.
    ///
    /// The screen is deep-copied; the caller's buffer is never aliased.
    /// Appends while the ring has room, otherwise overwrites the oldest
    /// slot in place.
    pub fn capture(&mut self, screen: &[String], time_ms: u64) {
        if self.capacity == 0 {
            return;
        }
        let frame = Frame {
            screen: screen.to_vec(),
            time_ms,
        };
        if self.len < self.capacity {
            self.slots.push(frame);
            self.len += 1;
        } else {
            self.slots[self.start] = frame;
            self.start = (self.start + 1) % self.capacity;
        }
    }

    /// Capture the screen of a processed update (the live-path feed).
    pub fn capture_update(&mut self, update: &ProcessedUpdate, time_ms: u64) {
        self.capture(&update.screen, time_ms);
    }

    /// Frame at logical index (0 = oldest).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Frame> {
        if index < self.len {
            Some(&self.slots[(self.start + index) % self.slots.len()])
        } else {
            None
        }
    }

    /// Copy out all frames, oldest to newest.
    ///
    /// Copy-on-read: the returned snapshot is consistent even if capture
    /// runs again immediately afterwards.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        (0..self.len)
            .map(|i| self.slots[(self.start + i) % self.slots.len()].clone())
            .collect()
    }

    /// Timestamp of the oldest frame.
    #[must_use]
    pub fn first_time_ms(&self) -> Option<u64> {
        self.get(0).map(|f| f.time_ms)
    }

    /// Timestamp of the newest frame.
    #[must_use]
    pub fn last_time_ms(&self) -> Option<u64> {
        self.len.checked_sub(1).and_then(|i| self.get(i)).map(|f| f.time_ms)
    }

    /// Span between the first and last frame in milliseconds (zero when
    /// fewer than two frames are held).
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        match (self.first_time_ms(), self.last_time_ms()) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }

    /// Change the capacity, immediately dropping excess oldest frames.
    ///
    /// A capacity reduction re-bounds the ring right away rather than
    /// merely stopping growth.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        let mut frames = self.frames();
        if frames.len() > capacity {
            frames.drain(..frames.len() - capacity);
        }
        self.slots = frames;
        self.start = 0;
        self.len = self.slots.len();
        self.capacity = capacity;
    }

    /// Drop all frames, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.start = 0;
        self.len = 0;
    }
}

impl Default for FrameRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CAPACITY)
    }
}
