// src/annotations.rs
// Per-line error annotations, at most one per line

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::surface::{EditorSurface, LineId};

/// The annotation currently shown on a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub range: Range<usize>,
    pub message: String,
}

/// Tracks which lines carry an error annotation and mirrors changes to the editor.
///
/// Nothing is persisted.
pub struct AnnotationManager {
    surface: Arc<dyn EditorSurface>,
    records: Mutex<HashMap<LineId, AnnotationRecord>>,
}

impl AnnotationManager {
    pub fn new(surface: Arc<dyn EditorSurface>) -> Self {
        Self {
            surface,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Show `message` over `range` of `line`, replacing any previous annotation.
    ///
    /// The editor receives a single replacing call, never a clear followed by a set.
    pub fn set_error(&self, line: LineId, range: Range<usize>, message: impl Into<String>) {
        let record = AnnotationRecord {
            range,
            message: message.into(),
        };
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.get(&line) == Some(&record) {
            return;
        }
        debug!(line = %line, message = %record.message, "Annotating line");
        self.surface
            .set_line_annotation(line, record.range.clone(), &record.message);
        records.insert(line, record);
    }

    /// Remove the annotation on `line`; no-op when there is none
    pub fn clear(&self, line: LineId) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.remove(&line).is_some() {
            debug!(line = %line, "Clearing line annotation");
            self.surface.clear_line_annotation(line);
        }
    }

    pub fn get(&self, line: LineId) -> Option<AnnotationRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&line)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
