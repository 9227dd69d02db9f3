#![forbid(unsafe_code)]

//! Bounded scrollback buffer.
//!
//! Stores lines that have scrolled off the visible viewport, capped at a
//! configured capacity with FIFO eviction: the buffer never exceeds its
//! capacity after any operation, and trimming always discards the oldest
//! lines first while preserving insertion order.
//!
//! Storage is a fixed-capacity arena with a logical start index, so eviction
//! overwrites the oldest slot in place instead of shifting or reallocating.

/// Capacity-bounded FIFO line buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollbackBuffer {
    slots: Vec<String>,
    start: usize,
    len: usize,
    capacity: usize,
}

impl ScrollbackBuffer {
    /// Create an empty buffer with the given line capacity.
    ///
    /// A capacity of zero makes every push a no-op.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            start: 0,
            len: 0,
            capacity,
        }
    }

    /// Capacity in lines.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of stored lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a line, evicting the oldest if the buffer is full.
    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.len < self.capacity {
            // Arena still growing toward capacity: slots are in logical order.
            self.slots.push(line);
            self.len += 1;
        } else {
            // Full: overwrite the oldest slot in place.
            self.slots[self.start] = line;
            self.start = (self.start + 1) % self.capacity;
        }
    }

    /// Append every line from an iterator, oldest first.
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        for line in lines {
            self.push(line);
        }
    }

    /// Iterate stored lines, oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        (0..self.len).map(move |i| self.slots[(self.start + i) % self.slots.len().max(1)].as_str())
    }

    /// Copy out the stored lines, oldest to newest.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }

    /// Change the capacity, immediately dropping excess oldest lines.
    ///
    /// Re-applying the current capacity is a no-op.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        // Rebuild the arena in logical order, keeping the newest lines.
        let mut lines = self.to_vec();
        if lines.len() > capacity {
            lines.drain(..lines.len() - capacity);
        }
        self.slots = lines;
        self.start = 0;
        self.len = self.slots.len();
        self.capacity = capacity;
    }

    /// Drop all stored lines, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.start = 0;
        self.len = 0;
    }
}

impl Default for ScrollbackBuffer {
    fn default() -> Self {
        Self::new(0)
    }
}
