// src/analyzer.rs
// Entry point for editor events: inline solving and debounced correction

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::annotations::AnnotationManager;
use crate::config::{Settings, SolverKind};
use crate::correction::{
    CorrectionTransport, DebounceScheduler, SchedulerState, StreamingCorrector,
};
use crate::currency::{CurrencyAdapter, ExchangeRateClient};
use crate::llm::{ChatClient, LlmClient};
use crate::solver::{AiStrategy, InlineSolver, LocalStrategy, SolveOutcome, SolveStrategy};
use crate::surface::{CorrectionObserver, EditorSurface, LineId, Status, StatusSink};

/// Thresholds for sending a document to correction
#[derive(Debug, Clone)]
pub struct CorrectionGate {
    pub quiet_period: Duration,
    /// Documents shorter than this (trimmed) are never sent
    pub min_chars: usize,
}

impl Default for CorrectionGate {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(crate::config::DEFAULT_QUIET_PERIOD_MS),
            min_chars: crate::config::DEFAULT_MIN_CORRECTION_CHARS,
        }
    }
}

impl CorrectionGate {
    /// True when `document` is worth a correction request
    pub fn admits(&self, document: &str) -> bool {
        let trimmed = document.trim();
        if trimmed.chars().count() < self.min_chars {
            return false;
        }
        // a lone `... =` line belongs to the inline solver
        !(trimmed.lines().count() == 1 && trimmed.ends_with('='))
    }
}

/// Host-facing core: one instance per open document
pub struct Analyzer {
    solver: InlineSolver,
    annotations: AnnotationManager,
    scheduler: DebounceScheduler<StreamingCorrector>,
    surface: Arc<dyn EditorSurface>,
    status: Arc<dyn StatusSink>,
    gate: CorrectionGate,
}

/// Collaborators the host provides
pub struct Host {
    pub surface: Arc<dyn EditorSurface>,
    pub status: Arc<dyn StatusSink>,
    pub observer: Arc<dyn CorrectionObserver>,
}

impl Analyzer {
    pub fn new(
        host: Host,
        strategy: Arc<dyn SolveStrategy>,
        transport: Option<Arc<dyn CorrectionTransport>>,
        instruction: impl Into<String>,
        gate: CorrectionGate,
    ) -> Self {
        let corrector = StreamingCorrector::new(
            transport,
            instruction,
            host.observer.clone(),
            host.status.clone(),
        );
        Self {
            solver: InlineSolver::new(strategy),
            annotations: AnnotationManager::new(host.surface.clone()),
            scheduler: DebounceScheduler::new(Arc::new(corrector), host.status.clone()),
            surface: host.surface,
            status: host.status,
            gate,
        }
    }

    /// Wire real HTTP collaborators from resolved settings
    pub fn from_settings(settings: &Settings, host: Host) -> Self {
        let currency = CurrencyAdapter::new(Arc::new(ExchangeRateClient::new(
            settings.currency_api.clone(),
        )));

        let strategy: Arc<dyn SolveStrategy> = match settings.solver {
            SolverKind::Local => Arc::new(LocalStrategy::new(currency)),
            SolverKind::Ai => {
                let llm = settings.api_key.clone().map(|key| {
                    Arc::new(ChatClient::with_model(
                        key,
                        settings.api_base.clone(),
                        settings.solver_model.clone(),
                    )) as Arc<dyn LlmClient>
                });
                Arc::new(AiStrategy::new(llm, currency))
            }
        };

        let transport = settings.api_key.clone().map(|key| {
            Arc::new(ChatClient::with_model(
                key,
                settings.api_base.clone(),
                settings.model.clone(),
            )) as Arc<dyn CorrectionTransport>
        });

        info!(
            solver = %settings.solver,
            corrections = transport.is_some(),
            quiet_ms = settings.quiet_period.as_millis() as u64,
            "Analyzer ready"
        );

        Self::new(
            host,
            strategy,
            transport,
            settings.correction_prompt.clone(),
            CorrectionGate {
                quiet_period: settings.quiet_period,
                min_chars: settings.min_correction_chars,
            },
        )
    }

    /// A line was edited. Solves it when it ends in `=`.
    ///
    /// Success inserts `" " + answer` at the line end and clears any annotation;
    /// failure annotates the expression. Lines that are not solver syntax lose
    /// their annotation and are otherwise left alone.
    #[instrument(skip(self, text, document), fields(line = %line))]
    pub async fn on_line_changed(&self, line: LineId, text: &str, document: &str) -> SolveOutcome {
        let outcome = self.solver.solve_line(line, text, document).await;
        match &outcome {
            SolveOutcome::NotSolverLine | SolveOutcome::Unclassified => {
                self.annotations.clear(line);
            }
            SolveOutcome::Busy => {}
            SolveOutcome::Solved { answer } => {
                self.annotations.clear(line);
                self.surface
                    .insert_text_at_line_end(line, &format!(" {}", answer));
            }
            SolveOutcome::Failed { error, span } => {
                let message = error.to_string();
                self.annotations.set_error(line, span.clone(), message.clone());
                self.status.on_status(&Status::Error(message));
            }
        }
        outcome
    }

    /// The document changed; (re)start the debounced correction
    pub fn on_document_changed(&self, document: &str, cursor_line: LineId) {
        if document.trim().is_empty() {
            self.scheduler.schedule(String::new(), self.gate.quiet_period);
            return;
        }
        if !self.gate.admits(document) {
            debug!(cursor = %cursor_line, "Document not eligible for correction");
            self.scheduler.cancel();
            self.status.on_status(&Status::Idle);
            return;
        }
        debug!(cursor = %cursor_line, chars = document.len(), "Scheduling correction");
        self.scheduler.schedule(document, self.gate.quiet_period);
    }

    pub fn correction_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn annotations(&self) -> &AnnotationManager {
        &self.annotations
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.strategy_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_min_chars() {
        let gate = CorrectionGate::default();
        assert!(!gate.admits("short"));
        assert!(!gate.admits("   tiny    \n\n"));
        assert!(gate.admits("This sentence is long enough."));
    }

    #[test]
    fn test_gate_skips_single_solver_line() {
        let gate = CorrectionGate::default();
        assert!(!gate.admits("price * quantity + 20 ="));
        assert!(gate.admits("Some text here\nprice * quantity + 20 ="));
    }

    #[test]
    fn test_gate_custom_threshold() {
        let gate = CorrectionGate {
            quiet_period: Duration::from_millis(10),
            min_chars: 0,
        };
        assert!(gate.admits("hi"));
    }
}
