#![forbid(unsafe_code)]

//! Screen diff processor: raw server updates in, render-ready screens out.
//!
//! One [`DiffProcessor`] exists per terminal and owns that terminal's
//! scrollback ring. It consumes an [`UpdateMessage`] (sparse screen diff +
//! scrollback delta), runs the transform pipeline, and produces a
//! [`ProcessedUpdate`] for the rendering collaborator.
//!
//! The processor has no side effects beyond its own buffer state: no DOM,
//! no network, no clock. A malformed message is a hard failure for that one
//! message — it is rejected before any state is touched, so the scrollback
//! ring is never corrupted and the session continues with the next message.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::screen::{Screen, ScreenLine};
use crate::scrollback::ScrollbackBuffer;
use crate::transform::TransformRegistry;

/// Default cursor marker scanned for by the backspace heuristic (U+2588
/// FULL BLOCK). The rendering collaborator owns the actual glyph, so this
/// is host-configurable via [`DiffProcessor::with_cursor_marker`].
pub const DEFAULT_CURSOR_MARKER: char = '\u{2588}';

/// One raw update from the network/server collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    /// Terminal id this update belongs to.
    pub term: String,
    /// Sparse screen: `null` rows are unchanged from the previous screen.
    pub screen: Screen,
    /// Lines that scrolled off the viewport since the previous update.
    #[serde(default)]
    pub scrollback_delta: Vec<String>,
    /// Whether the caller wants the backspace-byte heuristic to run.
    #[serde(default)]
    pub want_backspace_hint: bool,
    /// Server-side rate limiter engaged for this terminal (pass-through).
    #[serde(default)]
    pub rate_limited: bool,
}

/// A processed update ready for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedUpdate {
    pub term: String,
    /// Transformed rows; an empty string means "leave the previously
    /// rendered row untouched".
    pub screen: Vec<String>,
    /// Full scrollback snapshot, oldest to newest, at most the configured
    /// capacity.
    pub scrollback: Vec<String>,
    /// Backspace byte the terminal should be told to use, when detected.
    #[serde(default)]
    pub backspace_hint: Option<BackspaceHint>,
    /// Pass-through of [`UpdateMessage::rate_limited`].
    #[serde(default)]
    pub rate_limited: bool,
    /// Rule-materialization failures encountered while processing.
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

/// Which literal backspace byte the terminal should use.
///
/// When a screen row shows a caret-style sequence (`^H` or `^?`) right
/// before the cursor, the emulator echoed the byte instead of erasing,
/// meaning it is configured for the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackspaceHint {
    /// Use `0x08` (`^H`).
    Backspace,
    /// Use `0x7f` (`^?`).
    Delete,
}

impl BackspaceHint {
    /// The literal byte to send for backspace.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::Backspace => 0x08,
            Self::Delete => 0x7f,
        }
    }
}

/// Errors from processing a single update message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Required fields missing or inconsistent; the message is dropped.
    MalformedUpdate { reason: String },
}

impl core::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MalformedUpdate { reason } => write!(f, "malformed update: {reason}"),
        }
    }
}

impl std::error::Error for ProcessError {}

/// Per-terminal diff processor state.
#[derive(Debug)]
pub struct DiffProcessor {
    term: String,
    scrollback: ScrollbackBuffer,
    cursor_marker: char,
}

impl DiffProcessor {
    /// Create a processor for one terminal with the given scrollback
    /// capacity.
    #[must_use]
    pub fn new(term: impl Into<String>, scrollback_capacity: usize) -> Self {
        Self {
            term: term.into(),
            scrollback: ScrollbackBuffer::new(scrollback_capacity),
            cursor_marker: DEFAULT_CURSOR_MARKER,
        }
    }

    /// Override the cursor marker scanned by the backspace heuristic.
    #[must_use]
    pub fn with_cursor_marker(mut self, marker: char) -> Self {
        self.cursor_marker = marker;
        self
    }

    /// Terminal id this processor serves.
    #[must_use]
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Read access to the accumulated scrollback.
    #[must_use]
    pub fn scrollback(&self) -> &ScrollbackBuffer {
        &self.scrollback
    }

    /// Re-bound the scrollback ring immediately.
    pub fn set_scrollback_capacity(&mut self, capacity: usize) {
        self.scrollback.set_capacity(capacity);
    }

    /// Process one update against the current scrollback and rule set.
    ///
    /// Validation happens before any mutation: a malformed message leaves
    /// the scrollback ring exactly as it was.
    pub fn process(
        &mut self,
        registry: &TransformRegistry,
        msg: &UpdateMessage,
    ) -> Result<ProcessedUpdate, ProcessError> {
        if msg.term.is_empty() {
            return Err(ProcessError::MalformedUpdate {
                reason: "missing terminal id".to_string(),
            });
        }
        if msg.term != self.term {
            return Err(ProcessError::MalformedUpdate {
                reason: format!(
                    "message for terminal {:?} reached processor for {:?}",
                    msg.term, self.term
                ),
            });
        }

        let (pipeline, diagnostics) = registry.pipeline();

        for line in &msg.scrollback_delta {
            self.scrollback.push(pipeline.apply(line));
        }

        let mut screen = Vec::with_capacity(msg.screen.len());
        for row in &msg.screen {
            match row {
                ScreenLine::Unchanged => screen.push(String::new()),
                ScreenLine::Text(text) => {
                    let trimmed = text.trim_end();
                    // An all-whitespace row keeps one space so it retains
                    // visual height when rendered.
                    let kept = if trimmed.is_empty() { " " } else { trimmed };
                    screen.push(pipeline.apply(kept));
                }
            }
        }

        let backspace_hint = if msg.want_backspace_hint {
            self.scan_backspace_hint(&msg.screen)
        } else {
            None
        };

        trace!(
            term = %self.term,
            rows = screen.len(),
            delta = msg.scrollback_delta.len(),
            scrollback = self.scrollback.len(),
            "update processed"
        );

        Ok(ProcessedUpdate {
            term: msg.term.clone(),
            screen,
            scrollback: self.scrollback.to_vec(),
            backspace_hint,
            rate_limited: msg.rate_limited,
            diagnostics,
        })
    }

    /// Scan raw rows for a cursor marker immediately preceded by a caret
    /// backspace sequence.
    ///
    /// An echoed `^?` means the emulator rejected `0x7f`, so it should use
    /// `0x08` — and vice versa. First match wins.
    fn scan_backspace_hint(&self, rows: &[ScreenLine]) -> Option<BackspaceHint> {
        let echoed_del = format!("^?{}", self.cursor_marker);
        let echoed_bs = format!("^H{}", self.cursor_marker);
        for row in rows {
            let Some(text) = row.text() else { continue };
            if text.contains(&echoed_del) {
                return Some(BackspaceHint::Backspace);
            }
            if text.contains(&echoed_bs) {
                return Some(BackspaceHint::Delete);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::RuleSpec;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn msg(term: &str, screen: &[Option<&str>]) -> UpdateMessage {
        UpdateMessage {
            term: term.to_string(),
            screen: screen
                .iter()
                .map(|r| match r {
                    None => ScreenLine::Unchanged,
                    Some(s) => ScreenLine::from(*s),
                })
                .collect(),
            scrollback_delta: Vec::new(),
            want_backspace_hint: false,
            rate_limited: false,
        }
    }

    fn spec(name: &str, pattern: &str, replacement: &str) -> RuleSpec {
        RuleSpec {
            name: name.to_string(),
            pattern: pattern.to_string(),
            flags: String::new(),
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn screen_length_is_preserved() {
        let mut proc = DiffProcessor::new("t1", 10);
        let reg = TransformRegistry::new();
        let update = msg("t1", &[Some("a"), None, Some("c"), None]);
        let out = proc.process(&reg, &update).unwrap();
        assert_eq!(out.screen.len(), 4);
    }

    #[test]
    fn unchanged_rows_become_empty_strings() {
        let mut proc = DiffProcessor::new("t1", 10);
        let reg = TransformRegistry::new();
        let out = proc
            .process(&reg, &msg("t1", &[None, Some("x")]))
            .unwrap();
        assert_eq!(out.screen, vec!["".to_string(), "x".to_string()]);
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        let mut proc = DiffProcessor::new("t1", 10);
        let reg = TransformRegistry::new();
        let out = proc.process(&reg, &msg("t1", &[Some("abc   ")])).unwrap();
        assert_eq!(out.screen, vec!["abc".to_string()]);
    }

    #[test]
    fn whitespace_only_row_keeps_one_space() {
        let mut proc = DiffProcessor::new("t1", 10);
        let reg = TransformRegistry::new();
        let out = proc
            .process(&reg, &msg("t1", &[Some("    "), Some("")]))
            .unwrap();
        assert_eq!(out.screen, vec![" ".to_string(), " ".to_string()]);
    }

    #[test]
    fn scrollback_delta_is_transformed_and_bounded() {
        let mut proc = DiffProcessor::new("t1", 3);
        let mut reg = TransformRegistry::new();
        reg.register(spec("up", "line", "LINE"));
        let mut update = msg("t1", &[Some("ok")]);
        update.scrollback_delta = vec![
            "line a".to_string(),
            "line b".to_string(),
            "line c".to_string(),
            "line d".to_string(),
        ];
        let out = proc.process(&reg, &update).unwrap();
        assert_eq!(
            out.scrollback,
            vec!["LINE b", "LINE c", "LINE d"]
        );
    }

    #[test]
    fn scrollback_accumulates_across_updates() {
        let mut proc = DiffProcessor::new("t1", 5);
        let reg = TransformRegistry::new();
        for chunk in [vec!["a"], vec!["b", "c"]] {
            let mut update = msg("t1", &[Some("x")]);
            update.scrollback_delta = chunk.iter().map(|s| s.to_string()).collect();
            proc.process(&reg, &update).unwrap();
        }
        assert_eq!(proc.scrollback().to_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn malformed_message_leaves_scrollback_untouched() {
        let mut proc = DiffProcessor::new("t1", 5);
        let reg = TransformRegistry::new();
        let mut seeded = msg("t1", &[Some("x")]);
        seeded.scrollback_delta = vec!["kept".to_string()];
        proc.process(&reg, &seeded).unwrap();

        let mut bad = msg("other", &[Some("y")]);
        bad.scrollback_delta = vec!["poison".to_string()];
        let err = proc.process(&reg, &bad).unwrap_err();
        assert!(matches!(err, ProcessError::MalformedUpdate { .. }));
        assert_eq!(proc.scrollback().to_vec(), vec!["kept"]);
    }

    #[test]
    fn empty_term_id_is_malformed() {
        let mut proc = DiffProcessor::new("", 5);
        let reg = TransformRegistry::new();
        let err = proc.process(&reg, &msg("", &[Some("x")])).unwrap_err();
        assert!(err.to_string().contains("missing terminal id"));
    }

    #[test]
    fn bad_rule_reports_one_diagnostic_and_rest_apply() {
        let mut proc = DiffProcessor::new("t1", 5);
        let mut reg = TransformRegistry::new();
        reg.register(spec("broken", "(((", "x"));
        reg.register(spec("ok", "a", "A"));
        let out = proc.process(&reg, &msg("t1", &[Some("a")])).unwrap();
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].contains("broken"));
        assert_eq!(out.screen, vec!["A".to_string()]);
    }

    #[test]
    fn backspace_hint_only_when_requested() {
        let marker = DEFAULT_CURSOR_MARKER;
        let mut proc = DiffProcessor::new("t1", 5);
        let reg = TransformRegistry::new();

        let row = format!("$ echo hi^?{marker}");
        let mut update = msg("t1", &[]);
        update.screen = vec![ScreenLine::Text(row)];
        let out = proc.process(&reg, &update).unwrap();
        assert_eq!(out.backspace_hint, None);

        update.want_backspace_hint = true;
        let out = proc.process(&reg, &update).unwrap();
        assert_eq!(out.backspace_hint, Some(BackspaceHint::Backspace));
        assert_eq!(out.backspace_hint.unwrap().byte(), 0x08);
    }

    #[test]
    fn echoed_caret_h_suggests_delete() {
        let marker = DEFAULT_CURSOR_MARKER;
        let mut proc = DiffProcessor::new("t1", 5);
        let reg = TransformRegistry::new();
        let mut update = msg("t1", &[]);
        update.screen = vec![ScreenLine::Text(format!("ls^H{marker}"))];
        update.want_backspace_hint = true;
        let out = proc.process(&reg, &update).unwrap();
        assert_eq!(out.backspace_hint, Some(BackspaceHint::Delete));
        assert_eq!(out.backspace_hint.unwrap().byte(), 0x7f);
    }

    #[test]
    fn no_marker_means_no_hint() {
        let mut proc = DiffProcessor::new("t1", 5);
        let reg = TransformRegistry::new();
        let mut update = msg("t1", &[Some("plain ^H text")]);
        update.want_backspace_hint = true;
        let out = proc.process(&reg, &update).unwrap();
        assert_eq!(out.backspace_hint, None);
    }

    #[test]
    fn rate_limited_flag_passes_through() {
        let mut proc = DiffProcessor::new("t1", 5);
        let reg = TransformRegistry::new();
        let mut update = msg("t1", &[Some("x")]);
        update.rate_limited = true;
        let out = proc.process(&reg, &update).unwrap();
        assert!(out.rate_limited);
    }

    #[test]
    fn update_message_deserializes_from_wire_json() {
        let json = r#"{
            "term": "tty-1",
            "screen": ["$ ls", null, "  "],
            "scrollback_delta": ["old line"]
        }"#;
        let update: UpdateMessage = serde_json::from_str(json).unwrap();
        assert_eq!(update.term, "tty-1");
        assert_eq!(update.screen.len(), 3);
        assert!(!update.want_backspace_hint);
    }

    #[test]
    fn missing_required_field_fails_to_deserialize() {
        // No `screen` — a hard failure for this message.
        let json = r#"{"term": "tty-1"}"#;
        assert!(serde_json::from_str::<UpdateMessage>(json).is_err());
    }

    proptest! {
        #[test]
        fn processed_screen_always_has_input_row_count(
            rows in proptest::collection::vec(proptest::option::of(".{0,12}"), 0..40)
        ) {
            let mut proc = DiffProcessor::new("t1", 8);
            let reg = TransformRegistry::new();
            let update = UpdateMessage {
                term: "t1".to_string(),
                screen: rows.iter().cloned().map(ScreenLine::from).collect(),
                scrollback_delta: Vec::new(),
                want_backspace_hint: false,
                rate_limited: false,
            };
            let out = proc.process(&reg, &update).unwrap();
            prop_assert_eq!(out.screen.len(), rows.len());
        }
    }
}
