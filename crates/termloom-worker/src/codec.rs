#![forbid(unsafe_code)]

//! JSON envelope codec for the worker protocol.
//!
//! Requests and responses serialize as adjacently tagged JSON objects:
//!
//! ```text
//! {"type": "process", "payload": { ...UpdateMessage... }}
//! {"type": "set_rules", "payload": [ ...RuleSpec... ]}
//! ```
//!
//! This is the boundary format for hosts where the worker lives behind a
//! textual channel (web-worker `postMessage`, subprocess pipe). Nothing but
//! data crosses: compiled patterns never survive the boundary, only their
//! [`RuleSpec`](termloom_core::RuleSpec) source text, re-materialized on the
//! worker side.
//!
//! A payload that does not deserialize — including an `UpdateMessage` with
//! missing required fields — is a hard failure for that one message; the
//! caller drops it and continues with the next.

use crate::worker::{WorkerRequest, WorkerResponse};

/// Protocol version string for handshake/debugging purposes.
pub const PROTOCOL_VERSION: &str = "termloom-worker-v1";

/// Errors from encoding or decoding protocol envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// JSON (de)serialization failed.
    Json { detail: String },
}

impl core::fmt::Display for CodecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Json { detail } => write!(f, "JSON error: {detail}"),
        }
    }
}

impl std::error::Error for CodecError {}

fn json_err(e: serde_json::Error) -> CodecError {
    CodecError::Json {
        detail: e.to_string(),
    }
}

/// Encode a request envelope.
pub fn encode_request(request: &WorkerRequest) -> Result<String, CodecError> {
    serde_json::to_string(request).map_err(json_err)
}

/// Decode a request envelope.
pub fn decode_request(input: &str) -> Result<WorkerRequest, CodecError> {
    serde_json::from_str(input).map_err(json_err)
}

/// Encode a response envelope.
pub fn encode_response(response: &WorkerResponse) -> Result<String, CodecError> {
    serde_json::to_string(response).map_err(json_err)
}

/// Decode a response envelope.
pub fn decode_response(input: &str) -> Result<WorkerResponse, CodecError> {
    serde_json::from_str(input).map_err(json_err)
}
