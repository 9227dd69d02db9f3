#![forbid(unsafe_code)]

//! Screen-update core for termloom: screen model, transform pipeline,
//! bounded scrollback, and the diff processor that turns raw server updates
//! into render-ready screens.
//!
//! This crate is host-agnostic: no threads, no I/O, no clocks. The worker
//! crate wraps [`DiffProcessor`] in a dedicated thread; the playback crate
//! consumes the processed screens it emits.

pub mod processor;
pub mod screen;
pub mod scrollback;
pub mod transform;

pub use processor::{
    BackspaceHint, DiffProcessor, ProcessError, ProcessedUpdate, UpdateMessage,
};
pub use screen::{Screen, ScreenLine};
pub use scrollback::ScrollbackBuffer;
pub use transform::{RuleError, RuleSpec, TransformRegistry};
