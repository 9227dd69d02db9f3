#![forbid(unsafe_code)]

//! Session recording and playback for termloom.
//!
//! [`FrameRecorder`] keeps a bounded ring of timestamped screen snapshots,
//! fed by every processed screen update. [`PlaybackScheduler`] maps a
//! virtual elapsed-time cursor onto recorded frames and is fully
//! deterministic (time advances only via explicit ticks); [`TickDriver`]
//! wraps it in a cancellable real-time tick thread. [`export`] serializes a
//! completed recording to an order-preserving NDJSON wire shape.

pub mod driver;
pub mod export;
pub mod recorder;
pub mod scheduler;

pub use driver::{PlaybackEvent, PlaybackSession, TickDriver};
pub use export::{ExportError, parse_recording, write_recording};
pub use recorder::{Frame, FrameRecorder};
pub use scheduler::{PlaybackScheduler, PlaybackState, TickOutcome};
