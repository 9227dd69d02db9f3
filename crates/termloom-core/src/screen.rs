#![forbid(unsafe_code)]

//! Screen model: an ordered sequence of lines as captured from one server
//! update.
//!
//! A row is either rendered text or the "unchanged" sentinel, which means
//! the row is identical to the previous screen and the renderer should leave
//! it alone. On the wire the sentinel arrives as JSON `null`, so the serde
//! form of [`ScreenLine`] is `Option<String>`.

use serde::{Deserialize, Serialize};

/// One row of a terminal screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ScreenLine {
    /// Row identical to the previous screen (wire form: `null`).
    Unchanged,
    /// Rendered, HTML-safe row content.
    Text(String),
}

impl ScreenLine {
    /// Row content, or `None` for the unchanged sentinel.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Unchanged => None,
            Self::Text(s) => Some(s),
        }
    }

    /// Whether this row is the unchanged sentinel.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

impl From<Option<String>> for ScreenLine {
    fn from(value: Option<String>) -> Self {
        match value {
            None => Self::Unchanged,
            Some(s) => Self::Text(s),
        }
    }
}

impl From<ScreenLine> for Option<String> {
    fn from(line: ScreenLine) -> Self {
        match line {
            ScreenLine::Unchanged => None,
            ScreenLine::Text(s) => Some(s),
        }
    }
}

impl From<&str> for ScreenLine {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// A full visible screen: ordered rows, index = row number, fixed length =
/// terminal row count at capture time.
pub type Screen = Vec<ScreenLine>;
