#![forbid(unsafe_code)]

//! Real-time tick driver for the playback scheduler.
//!
//! The scheduler itself is deterministic and host-driven; this module
//! supplies the host: a dedicated thread that wakes at the configured tick
//! interval, advances the scheduler by measured wall-clock time, and emits
//! [`PlaybackEvent`]s for the rendering collaborator.
//!
//! Recorder and scheduler live behind one mutex ([`PlaybackSession`])
//! because capture (writer) and driver ticks/seeks (reader) run on
//! different threads here. Cancellation is checked before every dispatch:
//! once [`TickDriver::stop`] returns, no further tick fires, even one that
//! was already scheduled. `stop` is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;
use web_time::{Duration, Instant};

use crate::recorder::{Frame, FrameRecorder};
use crate::scheduler::{PlaybackScheduler, TickOutcome};

/// Shared per-terminal playback state: the frame ring plus its scheduler.
///
/// Created when playback starts for a terminal and dropped when the
/// terminal closes; suspending the driver preserves the virtual cursor so
/// a workspace switch resumes where playback left off.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    pub recorder: FrameRecorder,
    pub scheduler: PlaybackScheduler,
}

impl PlaybackSession {
    /// Bundle a recorder and scheduler into a session.
    #[must_use]
    pub fn new(recorder: FrameRecorder, scheduler: PlaybackScheduler) -> Self {
        Self {
            recorder,
            scheduler,
        }
    }
}

/// Events emitted by the driver for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Render this frame.
    Frame { index: usize, frame: Frame },
    /// Playback reached the end: render the last frame and resume the live
    /// clock display.
    Finished { index: usize, frame: Frame },
}

struct CancelFlag {
    cancelled: AtomicBool,
    notify: (Mutex<()>, Condvar),
}

impl CancelFlag {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: (Mutex::new(()), Condvar::new()),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let (lock, cvar) = &self.notify;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        cvar.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wait up to `duration`; returns `true` if cancelled.
    fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let (lock, cvar) = &self.notify;
        let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let (_guard, _result) = cvar
            .wait_timeout(guard, duration)
            .unwrap_or_else(|e| e.into_inner());
        self.is_cancelled()
    }
}

/// Cancellable periodic tick thread driving one [`PlaybackSession`].
pub struct TickDriver {
    cancel: Arc<CancelFlag>,
    handle: Option<JoinHandle<()>>,
}

impl TickDriver {
    /// Spawn the tick thread.
    ///
    /// Events go to `events`; a vanished receiver is tolerated (the
    /// terminal may close mid-playback) and simply ends the thread.
    pub fn start(
        session: Arc<Mutex<PlaybackSession>>,
        events: mpsc::Sender<PlaybackEvent>,
    ) -> std::io::Result<Self> {
        let cancel = Arc::new(CancelFlag::new());
        let flag = Arc::clone(&cancel);
        let handle = thread::Builder::new()
            .name("termloom-playback".into())
            .spawn(move || tick_loop(&session, &events, &flag))?;
        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Cancel pending ticks immediately. Idempotent; safe to call from any
    /// thread. No tick fires after this returns.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and join the tick thread.
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn tick_loop(
    session: &Mutex<PlaybackSession>,
    events: &mpsc::Sender<PlaybackEvent>,
    cancel: &CancelFlag,
) {
    let mut last_tick: Option<Instant> = None;
    debug!("playback tick driver started");
    loop {
        let interval_ms = {
            let guard = session.lock().unwrap_or_else(|e| e.into_inner());
            guard.scheduler.tick_interval_ms()
        };
        if cancel.wait_timeout(Duration::from_millis(interval_ms)) {
            break;
        }
        let now = Instant::now();
        let elapsed_ms = last_tick
            .map(|t| now.duration_since(t).as_millis() as u64)
            .unwrap_or(interval_ms);
        last_tick = Some(now);

        let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;
        let outcome = state.scheduler.tick(&state.recorder, elapsed_ms);
        let event = match outcome {
            TickOutcome::Idle => None,
            TickOutcome::Frame(index) => state
                .recorder
                .get(index)
                .cloned()
                .map(|frame| PlaybackEvent::Frame { index, frame }),
            TickOutcome::Finished { last_frame } => state
                .recorder
                .get(last_frame)
                .cloned()
                .map(|frame| PlaybackEvent::Finished {
                    index: last_frame,
                    frame,
                }),
        };
        drop(guard);
        if let Some(event) = event {
            // Rendering collaborator gone: nothing left to drive.
            if events.send(event).is_err() {
                break;
            }
        }
    }
    debug!("playback tick driver stopped");
}
