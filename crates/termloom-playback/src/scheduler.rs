#![forbid(unsafe_code)]

//! Playback scheduler: virtual elapsed time mapped onto recorded frames.
//!
//! The scheduler is a deterministic state machine — time advances only via
//! explicit [`tick`](PlaybackScheduler::tick) calls, never via an internal
//! clock — so every transition is unit-testable without threads or sleeps.
//! The [`driver`](crate::driver) module supplies real-time ticks.
//!
//! State machine: `Stopped → Playing → (Paused | Stopped)`, with
//! `Playing ⇄ Scrubbing` for progress-bar drags and wheel steps. Scrubbing
//! suspends ticks but only moves the virtual cursor to the scrub target.
//! All time arithmetic is integer milliseconds relative to the first
//! frame's timestamp.

use tracing::debug;

use crate::recorder::FrameRecorder;

/// Default tick interval: roughly 15 ticks per second.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000 / 15;

/// Scheduler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Scrubbing,
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to render (not playing, or no frames).
    Idle,
    /// Render this frame index.
    Frame(usize),
    /// Playback ran past the last frame: snap to it, reset, stop. The host
    /// can resume its live-clock display.
    Finished { last_frame: usize },
}

/// Per-terminal playback cursor and state machine.
///
/// Owns no frames — it reads the [`FrameRecorder`] passed into each
/// operation, matching the playback data flow (scheduler → recorder,
/// read-only).
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    state: PlaybackState,
    virtual_ms: u64,
    resume_to: PlaybackState,
    tick_interval_ms: u64,
}

impl PlaybackScheduler {
    /// Create a stopped scheduler with the default tick rate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            virtual_ms: 0,
            resume_to: PlaybackState::Stopped,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }

    /// Override the tick interval (approximate target rate, not a hard
    /// real-time guarantee).
    #[must_use]
    pub fn with_tick_interval_ms(mut self, interval_ms: u64) -> Self {
        self.tick_interval_ms = interval_ms.max(1);
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Virtual elapsed milliseconds relative to the first frame.
    #[must_use]
    pub fn virtual_ms(&self) -> u64 {
        self.virtual_ms
    }

    /// Configured tick interval.
    #[must_use]
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    /// Begin playback from the start.
    ///
    /// Returns `false` (and stays `Stopped`) with an empty frame buffer —
    /// nothing to play. A `start` during scrubbing is a no-op: playback
    /// state changes only through [`end_scrub`](Self::end_scrub).
    pub fn start(&mut self, recorder: &FrameRecorder) -> bool {
        if recorder.is_empty() || self.state == PlaybackState::Scrubbing {
            return false;
        }
        if self.state == PlaybackState::Stopped {
            self.virtual_ms = 0;
        }
        debug!(frames = recorder.len(), "playback started");
        self.state = PlaybackState::Playing;
        true
    }

    /// Advance virtual time by `elapsed_ms` and pick the frame to render.
    ///
    /// Only advances while `Playing`; paused, stopped, and scrubbing
    /// schedulers return [`TickOutcome::Idle`].
    pub fn tick(&mut self, recorder: &FrameRecorder, elapsed_ms: u64) -> TickOutcome {
        if self.state != PlaybackState::Playing {
            return TickOutcome::Idle;
        }
        if recorder.is_empty() {
            self.state = PlaybackState::Stopped;
            return TickOutcome::Idle;
        }
        self.virtual_ms += elapsed_ms;
        if self.virtual_ms > recorder.duration_ms() {
            // Finished: snap to the last frame, reset the cursor, stop.
            let last_frame = recorder.len() - 1;
            self.virtual_ms = 0;
            self.state = PlaybackState::Stopped;
            debug!(last_frame, "playback finished");
            return TickOutcome::Finished { last_frame };
        }
        match Self::select_frame(recorder, self.virtual_ms) {
            Some(index) => TickOutcome::Frame(index),
            None => TickOutcome::Idle,
        }
    }

    /// Index of the last frame whose timestamp is ≤ the virtual cursor.
    ///
    /// `None` with no frames, or if the cursor is somehow before the first
    /// frame. Among frames sharing a timestamp the earliest index wins.
    #[must_use]
    pub fn select_frame(recorder: &FrameRecorder, virtual_ms: u64) -> Option<usize> {
        let first = recorder.first_time_ms()?;
        let target = first + virtual_ms;
        // Frames are ordered by capture time; binary search for the count
        // of frames at or before the target.
        let mut lo = 0usize;
        let mut hi = recorder.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if recorder.get(mid).is_some_and(|f| f.time_ms <= target) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let mut index = lo.checked_sub(1)?;
        // Tie toward the earlier frame on duplicate timestamps.
        while index > 0 {
            let (prev, cur) = (recorder.get(index - 1)?, recorder.get(index)?);
            if prev.time_ms == cur.time_ms {
                index -= 1;
            } else {
                break;
            }
        }
        Some(index)
    }

    /// Jump to a position expressed as a fraction of the recording.
    ///
    /// `percent` is clamped to `[0, 1]` and mapped linearly onto the span
    /// between the first and last frame. Returns the frame to render
    /// immediately, without waiting for the next tick.
    ///
    /// Seeking while `Playing` enters `Scrubbing` first, so a pending tick
    /// cannot advance the cursor past the seek target; call
    /// [`end_scrub`](Self::end_scrub) to resume.
    pub fn seek(&mut self, recorder: &FrameRecorder, percent: f64) -> Option<usize> {
        if recorder.is_empty() {
            return None;
        }
        if self.state == PlaybackState::Playing {
            self.begin_scrub();
        }
        let clamped = percent.clamp(0.0, 1.0);
        let span = recorder.duration_ms();
        self.virtual_ms = (clamped * span as f64).round() as u64;
        Self::select_frame(recorder, self.virtual_ms)
    }

    /// Enter scrubbing: remember the current state and suspend ticks.
    pub fn begin_scrub(&mut self) {
        if self.state != PlaybackState::Scrubbing {
            self.resume_to = self.state;
            self.state = PlaybackState::Scrubbing;
        }
    }

    /// Leave scrubbing, returning to the state captured by
    /// [`begin_scrub`](Self::begin_scrub).
    pub fn end_scrub(&mut self) {
        if self.state == PlaybackState::Scrubbing {
            self.state = self.resume_to;
        }
    }

    /// Suspend ticks, preserving the virtual cursor. Idempotent. Also used
    /// when the owning terminal loses focus (workspace switch): resuming
    /// later continues where playback left off.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Resume from pause, preserving the virtual cursor. Idempotent.
    pub fn resume(&mut self, recorder: &FrameRecorder) {
        if self.state == PlaybackState::Paused && !recorder.is_empty() {
            self.state = PlaybackState::Playing;
        }
    }

    /// Stop playback and reset the cursor. Idempotent; no tick fires after
    /// this returns.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.virtual_ms = 0;
    }

    /// Fraction of the recording still ahead of the cursor, clamped to
    /// `[0, 1]` to absorb timing overshoot on the final tick. Zero-span
    /// recordings report `0.0`.
    #[must_use]
    pub fn progress(&self, recorder: &FrameRecorder) -> f64 {
        let span = recorder.duration_ms();
        if span == 0 {
            return 0.0;
        }
        ((span.saturating_sub(self.virtual_ms)) as f64 / span as f64).clamp(0.0, 1.0)
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}
