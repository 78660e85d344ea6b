// src/lib.rs
// Margin - reactive text analysis for an editor side panel

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod analyzer;
pub mod annotations;
pub mod config;
pub mod correction;
pub mod currency;
pub mod error;
pub mod llm;
pub mod solver;
pub mod surface;
pub mod utils;

pub use analyzer::{Analyzer, CorrectionGate, Host};
pub use error::{MarginError, Result};
pub use surface::{CorrectionObserver, EditorSurface, LineId, Status, StatusSink};
