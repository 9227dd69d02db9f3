#![forbid(unsafe_code)]

//! Recording export: NDJSON serialization of a completed frame sequence.
//!
//! The wire shape is newline-delimited JSON: a header object first, then
//! one `[time_ms, screen]` array per frame, order-preserving:
//!
//! ```text
//! {"version":1,"frames":3,"duration_ms":200}
//! [0,["$ ls","a.txt"]]
//! [100,["$ cat a.txt",""]]
//! [200,["hello",""]]
//! ```
//!
//! No compression is imposed here — the external rendering/export service
//! decides. A recording that cannot be parsed yields an explicit
//! [`ExportError`] rather than a silent failure.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::recorder::Frame;

/// Current recording format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header line of a serialized recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordingHeader {
    version: u32,
    frames: usize,
    duration_ms: u64,
}

/// Errors from reading a serialized recording.
#[derive(Debug)]
pub enum ExportError {
    /// The input is empty or its first line is not a valid header.
    MissingHeader,
    /// The header declares a version this reader does not understand.
    UnsupportedVersion { found: u32 },
    /// A frame record failed to parse (1-based line number).
    BadRecord { line: usize, detail: String },
    /// The file holds a different number of frames than the header
    /// declares (truncated mid-write or otherwise corrupted).
    Truncated { expected: usize, found: usize },
}

impl core::fmt::Display for ExportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingHeader => {
                write!(f, "could not read recording: missing or invalid header")
            }
            Self::UnsupportedVersion { found } => {
                write!(
                    f,
                    "could not read recording: unsupported version {found} (expected {FORMAT_VERSION})"
                )
            }
            Self::BadRecord { line, detail } => {
                write!(f, "could not read recording: bad record on line {line}: {detail}")
            }
            Self::Truncated { expected, found } => {
                write!(
                    f,
                    "could not read recording: header declares {expected} frames, file holds {found}"
                )
            }
        }
    }
}

impl std::error::Error for ExportError {}

/// Serialize a frame sequence to the NDJSON wire shape.
pub fn write_recording<W: Write>(output: &mut W, frames: &[Frame]) -> io::Result<()> {
    let duration_ms = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => last.time_ms.saturating_sub(first.time_ms),
        _ => 0,
    };
    let header = RecordingHeader {
        version: FORMAT_VERSION,
        frames: frames.len(),
        duration_ms,
    };
    let header_json = serde_json::to_string(&header).map_err(io::Error::other)?;
    writeln!(output, "{header_json}")?;
    for frame in frames {
        let record =
            serde_json::to_string(&(frame.time_ms, &frame.screen)).map_err(io::Error::other)?;
        writeln!(output, "{record}")?;
    }
    output.flush()?;
    info!(
        frames = frames.len(),
        duration_ms, "recording exported"
    );
    Ok(())
}

/// Parse a serialized recording back into its frame sequence.
pub fn parse_recording(input: &str) -> Result<Vec<Frame>, ExportError> {
    let mut lines = input.lines().enumerate();
    let header: RecordingHeader = match lines.next() {
        Some((_, first)) => serde_json::from_str(first).map_err(|_| ExportError::MissingHeader)?,
        None => return Err(ExportError::MissingHeader),
    };
    if header.version != FORMAT_VERSION {
        return Err(ExportError::UnsupportedVersion {
            found: header.version,
        });
    }
    let mut frames = Vec::with_capacity(header.frames);
    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let (time_ms, screen): (u64, Vec<String>) =
            serde_json::from_str(line).map_err(|e| ExportError::BadRecord {
                line: index + 1,
                detail: e.to_string(),
            })?;
        frames.push(Frame { screen, time_ms });
    }
    if frames.len() != header.frames {
        return Err(ExportError::Truncated {
            expected: header.frames,
            found: frames.len(),
        });
    }
    Ok(frames)
}
