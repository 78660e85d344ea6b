// src/correction/scheduler.rs
// Debounce: one correction per quiet period, newer edits supersede older runs

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::session::CorrectionSession;
use crate::surface::{Status, StatusSink};

/// What the scheduler runs once the quiet period elapses
#[async_trait]
pub trait CorrectionAction: Send + Sync + 'static {
    /// Run a correction for `session.content()`; return when it has ended
    async fn run(&self, session: Arc<CorrectionSession>);

    /// The scheduled content was blank
    fn cleared(&self);
}

/// Coarse scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Timer armed, quiet period not yet over
    Pending,
    /// A session is in flight
    Running,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    timer: Option<JoinHandle<()>>,
    current: Option<Arc<CorrectionSession>>,
}

impl Inner {
    /// Disarm the timer and supersede the running session
    fn reset(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(session) = self.current.take()
            && session.supersede()
        {
            info!(session = %session.id(), generation = session.generation(), "Correction superseded");
        }
        self.generation += 1;
    }
}

/// Coalesces rapid `schedule` calls into a single action run.
///
/// Must be used from within a tokio runtime. Status sinks and actions must not
/// call back into the scheduler synchronously.
pub struct DebounceScheduler<A: CorrectionAction> {
    action: Arc<A>,
    status: Arc<dyn StatusSink>,
    inner: Arc<Mutex<Inner>>,
}

impl<A: CorrectionAction> DebounceScheduler<A> {
    pub fn new(action: Arc<A>, status: Arc<dyn StatusSink>) -> Self {
        Self {
            action,
            status,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn action(&self) -> &Arc<A> {
        &self.action
    }

    /// Restart the quiet period with `content`.
    ///
    /// Blank content cancels everything, reports `idle` and fires `cleared`
    /// without arming a timer. The action later sees exactly this content.
    pub fn schedule(&self, content: impl Into<String>, quiet_period: Duration) {
        let content = content.into();
        let mut inner = lock(&self.inner);
        inner.reset();

        if content.trim().is_empty() {
            drop(inner);
            debug!("Blank content, clearing");
            self.status.on_status(&Status::Idle);
            self.action.cleared();
            return;
        }

        let generation = inner.generation;
        debug!(generation, quiet_ms = quiet_period.as_millis() as u64, "Correction scheduled");
        // still holding the lock: the timer cannot observe state before `waiting` is out
        self.status.on_status(&Status::Waiting);
        inner.timer = Some(tokio::spawn(fire(
            self.inner.clone(),
            self.action.clone(),
            generation,
            content,
            quiet_period,
        )));
    }

    /// Cancel any pending or running correction without reporting anything
    pub fn cancel(&self) {
        lock(&self.inner).reset();
    }

    pub fn state(&self) -> SchedulerState {
        let inner = lock(&self.inner);
        if inner.current.is_some() {
            SchedulerState::Running
        } else if inner.timer.is_some() {
            SchedulerState::Pending
        } else {
            SchedulerState::Idle
        }
    }

    pub fn current_session(&self) -> Option<Arc<CorrectionSession>> {
        lock(&self.inner).current.clone()
    }
}

impl<A: CorrectionAction> Drop for DebounceScheduler<A> {
    fn drop(&mut self) {
        lock(&self.inner).reset();
    }
}

async fn fire<A: CorrectionAction>(
    inner: Arc<Mutex<Inner>>,
    action: Arc<A>,
    generation: u64,
    content: String,
    quiet_period: Duration,
) {
    tokio::time::sleep(quiet_period).await;

    let session = {
        let mut guard = lock(&inner);
        if guard.generation != generation {
            return;
        }
        let session = Arc::new(CorrectionSession::new(generation, content));
        guard.current = Some(session.clone());
        guard.timer = None;
        session
    };

    info!(
        session = %session.id(),
        generation,
        fingerprint = %&session.fingerprint()[..12],
        chars = session.content().chars().count(),
        "Correction started"
    );
    action.run(session.clone()).await;

    let mut guard = lock(&inner);
    if guard
        .current
        .as_ref()
        .is_some_and(|current| Arc::ptr_eq(current, &session))
    {
        guard.current = None;
    }
    debug!(session = %session.id(), state = ?session.state(), "Correction finished");
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
