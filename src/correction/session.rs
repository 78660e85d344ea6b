// src/correction/session.rs
// One debounced correction run: captured content, cancellation, streamed text

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle of a session. Only `Running` moves; the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Completed,
    Failed,
    Superseded,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    text: String,
}

/// A correction created when the quiet period elapses.
///
/// The content is frozen at schedule time. Superseding cancels the token so
/// the stream stops and late chunks are dropped.
#[derive(Debug)]
pub struct CorrectionSession {
    id: Uuid,
    generation: u64,
    content: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
    inner: Mutex<SessionInner>,
}

impl CorrectionSession {
    pub fn new(generation: u64, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4(),
            generation,
            fingerprint: fingerprint(&content),
            content,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Running,
                text: String::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Document text captured when the correction was scheduled
    pub fn content(&self) -> &str {
        &self.content
    }

    /// SHA-256 of `content`, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn is_superseded(&self) -> bool {
        self.state() == SessionState::Superseded
    }

    /// Text assembled so far
    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    /// Replace the assembled text; false once the session has ended
    pub fn update_text(&self, text: &str) -> bool {
        let mut inner = self.lock();
        if inner.state != SessionState::Running {
            return false;
        }
        inner.text.clear();
        inner.text.push_str(text);
        true
    }

    /// Mark superseded and cancel the stream; false if it had already ended
    pub fn supersede(&self) -> bool {
        let moved = self.transition(SessionState::Superseded);
        self.cancel.cancel();
        moved
    }

    pub fn complete(&self, text: &str) -> bool {
        self.update_text(text) && self.transition(SessionState::Completed)
    }

    pub fn fail(&self) -> bool {
        self.transition(SessionState::Failed)
    }

    fn transition(&self, to: SessionState) -> bool {
        let mut inner = self.lock();
        if inner.state != SessionState::Running {
            return false;
        }
        inner.state = to;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fingerprint(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = CorrectionSession::new(3, "Helo world");
        assert_eq!(session.generation(), 3);
        assert_eq!(session.content(), "Helo world");
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.text().is_empty());
        assert!(!session.cancel_token().is_cancelled());
        assert!(session.created_at() <= Utc::now());
    }

    #[test]
    fn test_fingerprint_is_sha256_of_content() {
        let session = CorrectionSession::new(1, "abc");
        assert_eq!(
            session.fingerprint(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let other = CorrectionSession::new(2, "abc");
        assert_eq!(session.fingerprint(), other.fingerprint());
        assert_ne!(session.id(), other.id());
    }

    #[test]
    fn test_complete() {
        let session = CorrectionSession::new(1, "x");
        assert!(session.update_text("Hel"));
        assert!(session.complete("Hello"));
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.text(), "Hello");
        assert!(!session.update_text("late"));
        assert_eq!(session.text(), "Hello");
    }

    #[test]
    fn test_supersede_cancels_and_freezes() {
        let session = CorrectionSession::new(1, "x");
        session.update_text("partial");
        assert!(session.supersede());
        assert!(session.is_superseded());
        assert!(session.cancel_token().is_cancelled());
        assert!(!session.update_text("late chunk"));
        assert_eq!(session.text(), "partial");
        assert!(!session.complete("final"));
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        let session = CorrectionSession::new(1, "x");
        assert!(session.fail());
        assert!(!session.supersede());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!session.is_running());
    }
}
