#![forbid(unsafe_code)]

//! Off-thread screen-update processing for termloom.
//!
//! [`ProcessorWorker`] runs every [`DiffProcessor`](termloom_core::DiffProcessor)
//! on a dedicated thread with no shared memory: requests and responses cross
//! as copied messages over bounded channels, processed strictly in arrival
//! order. This keeps CPU-heavy text transformation off the thread that must
//! stay responsive to user input.
//!
//! The [`codec`] module serializes the same request/response types to JSON
//! envelopes for hosts whose worker boundary is textual (a web-worker
//! `postMessage` shim, a subprocess pipe). Transform rules always cross as
//! source text and are re-materialized worker-side.

pub mod codec;
pub mod worker;

pub use codec::{
    CodecError, PROTOCOL_VERSION, decode_request, decode_response, encode_request,
    encode_response,
};
pub use worker::{
    ProcessorWorker, WorkerConfig, WorkerError, WorkerRequest, WorkerResponse,
};
