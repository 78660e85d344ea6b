// src/surface.rs
// Callbacks the core drives on its host: editor edits, status line, correction output

use std::fmt;
use std::ops::Range;

/// Zero-based line index in the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(pub usize);

impl LineId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for LineId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Scheduler/assembler state as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Waiting,
    Requesting,
    Streaming,
    Idle,
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Requesting => write!(f, "requesting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Idle => write!(f, "idle"),
            Self::Error(detail) => write!(f, "error: {}", detail),
        }
    }
}

/// Edits and decorations applied to the host editor.
///
/// `range` is in character columns of the line.
pub trait EditorSurface: Send + Sync {
    fn insert_text_at_line_end(&self, line: LineId, text: &str);

    /// Replaces whatever annotation the line had
    fn set_line_annotation(&self, line: LineId, range: Range<usize>, message: &str);

    fn clear_line_annotation(&self, line: LineId);
}

/// Receives every status transition
pub trait StatusSink: Send + Sync {
    fn on_status(&self, status: &Status);
}

/// Receives the corrected text of the current session
pub trait CorrectionObserver: Send + Sync {
    /// Cumulative text assembled so far
    fn on_delta(&self, text: &str);

    fn on_done(&self, text: &str);

    fn on_error(&self, error: &str);

    /// The document became blank; any shown correction should go
    fn on_cleared(&self) {}
}
