// src/correction/mod.rs
// Debounced whole-document correction streamed back from a chat model

pub mod assembler;
pub mod scheduler;
pub mod session;
pub mod sse;

pub use assembler::{AssemblyObserver, AssemblyOutcome, StreamAssembler};
pub use scheduler::{CorrectionAction, DebounceScheduler, SchedulerState};
pub use session::{CorrectionSession, SessionState};

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::error::{MarginError, Result};
use crate::llm::{ByteStream, ChatClient, Message};
use crate::surface::{CorrectionObserver, Status, StatusSink};

pub const DEFAULT_CORRECTION_PROMPT: &str = "Improve grammar and clarity";

/// Sampling temperature for corrections
pub const CORRECTION_TEMPERATURE: f32 = 0.3;

/// Rules appended to every instruction; not configurable
const CORRECTION_RULES: &str = "RULES:\n\
- Return ONLY the corrected text\n\
- NO comments, explanations, or headers\n\
- Preserve all line breaks exactly";

/// Text to correct plus the natural-language instruction
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRequest {
    pub text: String,
    pub instruction: String,
}

impl CorrectionRequest {
    pub fn new(text: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            instruction: instruction.into(),
        }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are a text correction assistant. {}\n\n{}",
            self.instruction.trim(),
            CORRECTION_RULES
        )
    }

    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message::system(self.system_prompt()),
            Message::user(self.text.clone()),
        ]
    }
}

/// Opens the token stream for a correction request
#[async_trait]
pub trait CorrectionTransport: Send + Sync {
    async fn open(&self, request: &CorrectionRequest) -> Result<ByteStream>;
}

#[async_trait]
impl CorrectionTransport for ChatClient {
    async fn open(&self, request: &CorrectionRequest) -> Result<ByteStream> {
        self.chat_stream(request.messages(), Some(CORRECTION_TEMPERATURE))
            .await
    }
}

/// The scheduler's action: stream a correction and relay it to the host
pub struct StreamingCorrector {
    transport: Option<Arc<dyn CorrectionTransport>>,
    instruction: String,
    observer: Arc<dyn CorrectionObserver>,
    status: Arc<dyn StatusSink>,
}

impl StreamingCorrector {
    /// `transport` is `None` when no API key is configured
    pub fn new(
        transport: Option<Arc<dyn CorrectionTransport>>,
        instruction: impl Into<String>,
        observer: Arc<dyn CorrectionObserver>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            transport,
            instruction: instruction.into(),
            observer,
            status,
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    fn fail(&self, session: &CorrectionSession, error: &MarginError) {
        if session.fail() {
            warn!(session = %session.id(), error = %error, "Correction failed");
            let detail = error.to_user_string();
            self.status.on_status(&Status::Error(detail.clone()));
            self.observer.on_error(&detail);
        }
    }
}

#[async_trait]
impl CorrectionAction for StreamingCorrector {
    async fn run(&self, session: Arc<CorrectionSession>) {
        let Some(transport) = &self.transport else {
            self.fail(&session, &MarginError::MissingApiKey);
            return;
        };

        if !session.is_running() {
            return;
        }
        self.status.on_status(&Status::Requesting);

        let request = CorrectionRequest::new(session.content(), self.instruction.as_str());
        let opened = tokio::select! {
            biased;
            _ = session.cancel_token().cancelled() => {
                debug!(session = %session.id(), "Superseded before the stream opened");
                return;
            }
            opened = transport.open(&request) => opened,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(&session, &e);
                return;
            }
        };

        let relay = SessionRelay {
            corrector: self,
            session: &session,
            streaming: AtomicBool::new(false),
        };
        match StreamAssembler::new()
            .consume(stream, session.cancel_token(), &relay)
            .await
        {
            AssemblyOutcome::Completed(text) => {
                info!(session = %session.id(), chars = text.chars().count(), "Correction complete");
            }
            AssemblyOutcome::Failed(_) => {}
            AssemblyOutcome::Cancelled(partial) => {
                debug!(session = %session.id(), received = partial.len(), "Correction stream cancelled");
            }
        }
    }

    fn cleared(&self) {
        self.observer.on_cleared();
    }
}

/// Forwards assembler callbacks only while the session is still current
struct SessionRelay<'a> {
    corrector: &'a StreamingCorrector,
    session: &'a CorrectionSession,
    streaming: AtomicBool,
}

impl AssemblyObserver for SessionRelay<'_> {
    fn on_delta(&self, text: &str) {
        if !self.session.update_text(text) {
            return;
        }
        if !self.streaming.swap(true, Ordering::SeqCst) {
            self.corrector.status.on_status(&Status::Streaming);
        }
        self.corrector.observer.on_delta(text);
    }

    fn on_done(&self, text: &str) {
        if self.session.complete(text) {
            self.corrector.observer.on_done(text);
            self.corrector.status.on_status(&Status::Idle);
        }
    }

    fn on_error(&self, error: &MarginError) {
        self.corrector.fail(self.session, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    // ========================================================================
    // Request building
    // ========================================================================

    #[test]
    fn test_system_prompt() {
        let req = CorrectionRequest::new("teh text", "Fix typos");
        assert_eq!(
            req.system_prompt(),
            "You are a text correction assistant. Fix typos\n\nRULES:\n- Return ONLY the corrected text\n- NO comments, explanations, or headers\n- Preserve all line breaks exactly"
        );
        let messages = req.messages();
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "teh text");
    }

    // ========================================================================
    // Corrector runs
    // ========================================================================

    #[derive(Default)]
    struct Sink {
        statuses: Mutex<Vec<Status>>,
        deltas: Mutex<Vec<String>>,
        done: Mutex<Option<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl StatusSink for Sink {
        fn on_status(&self, status: &Status) {
            self.statuses.lock().unwrap().push(status.clone());
        }
    }

    impl CorrectionObserver for Sink {
        fn on_delta(&self, text: &str) {
            self.deltas.lock().unwrap().push(text.into());
        }

        fn on_done(&self, text: &str) {
            *self.done.lock().unwrap() = Some(text.into());
        }

        fn on_error(&self, error: &str) {
            self.errors.lock().unwrap().push(error.into());
        }
    }

    /// Hands out a prepared stream, or an API failure
    struct Canned {
        stream: Mutex<Option<ByteStream>>,
        seen: Mutex<Option<CorrectionRequest>>,
    }

    impl Canned {
        fn new(stream: Option<ByteStream>) -> Arc<Self> {
            Arc::new(Self {
                stream: Mutex::new(stream),
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl CorrectionTransport for Canned {
        async fn open(&self, request: &CorrectionRequest) -> Result<ByteStream> {
            *self.seen.lock().unwrap() = Some(request.clone());
            self.stream.lock().unwrap().take().ok_or(MarginError::Api {
                status: 401,
                body: "bad key".into(),
            })
        }
    }

    fn boxed<S>(stream: S) -> Option<ByteStream>
    where
        S: futures::Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Some(Box::pin(stream))
    }

    fn record(fragment: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": fragment}}]})
        )
    }

    fn corrector(transport: Option<Arc<dyn CorrectionTransport>>) -> (StreamingCorrector, Arc<Sink>) {
        let sink = Arc::new(Sink::default());
        (
            StreamingCorrector::new(transport, "Fix it", sink.clone(), sink.clone()),
            sink,
        )
    }

    #[tokio::test]
    async fn test_successful_run() {
        let body = vec![
            Ok(Bytes::from(record("Hello"))),
            Ok(Bytes::from(record(" there"))),
            Ok(Bytes::from("data: [DONE]\n")),
        ];
        let canned = Canned::new(boxed(futures::stream::iter(body)));
        let (corrector, sink) = corrector(Some(canned.clone() as Arc<dyn CorrectionTransport>));
        let session = Arc::new(CorrectionSession::new(1, "helo there"));

        corrector.run(session.clone()).await;

        assert_eq!(
            *sink.statuses.lock().unwrap(),
            vec![Status::Requesting, Status::Streaming, Status::Idle]
        );
        assert_eq!(*sink.deltas.lock().unwrap(), vec!["Hello", "Hello there"]);
        assert_eq!(sink.done.lock().unwrap().as_deref(), Some("Hello there"));
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.text(), "Hello there");

        let seen = canned.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.text, "helo there");
        assert_eq!(seen.instruction, "Fix it");
    }

    #[tokio::test]
    async fn test_open_failure_reports_error_status() {
        let canned = Canned::new(None);
        let (corrector, sink) = corrector(Some(canned as Arc<dyn CorrectionTransport>));
        let session = Arc::new(CorrectionSession::new(1, "text"));

        corrector.run(session.clone()).await;

        assert_eq!(
            *sink.statuses.lock().unwrap(),
            vec![Status::Requesting, Status::Error("API error 401".into())]
        );
        assert_eq!(*sink.errors.lock().unwrap(), vec!["API error 401"]);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_missing_transport() {
        let (corrector, sink) = corrector(None);
        let session = Arc::new(CorrectionSession::new(1, "text"));
        corrector.run(session.clone()).await;
        assert_eq!(
            *sink.statuses.lock().unwrap(),
            vec![Status::Error("no API key configured".into())]
        );
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_session() {
        let body = vec![
            Ok(Bytes::from(record("Par"))),
            Err(MarginError::Stream("reset".into())),
        ];
        let canned = Canned::new(boxed(futures::stream::iter(body)));
        let (corrector, sink) = corrector(Some(canned as Arc<dyn CorrectionTransport>));
        let session = Arc::new(CorrectionSession::new(1, "text"));

        corrector.run(session.clone()).await;

        assert_eq!(
            sink.statuses.lock().unwrap().last(),
            Some(&Status::Error("stream error: reset".into()))
        );
        assert!(sink.done.lock().unwrap().is_none());
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_superseded_session_drops_late_deltas() {
        let (tx, rx) = mpsc::channel::<Result<Bytes>>(8);
        let canned = Canned::new(boxed(ReceiverStream::new(rx)));
        let (corrector, sink) = corrector(Some(canned as Arc<dyn CorrectionTransport>));
        let corrector = Arc::new(corrector);
        let session = Arc::new(CorrectionSession::new(1, "text"));

        let run = {
            let corrector = corrector.clone();
            let session = session.clone();
            tokio::spawn(async move { corrector.run(session).await })
        };

        tx.send(Ok(Bytes::from(record("early")))).await.unwrap();
        while sink.deltas.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }

        session.supersede();
        let _ = tx.send(Ok(Bytes::from(record(" late")))).await;
        let _ = tx.send(Ok(Bytes::from("data: [DONE]\n"))).await;
        drop(tx);
        run.await.unwrap();

        assert_eq!(*sink.deltas.lock().unwrap(), vec!["early"]);
        assert!(sink.done.lock().unwrap().is_none());
        assert_eq!(session.text(), "early");
        assert!(!sink.statuses.lock().unwrap().contains(&Status::Idle));
    }

    #[tokio::test]
    async fn test_cleared_forwards_to_observer() {
        #[derive(Default)]
        struct Cleared(Mutex<bool>);
        impl CorrectionObserver for Cleared {
            fn on_delta(&self, _: &str) {}
            fn on_done(&self, _: &str) {}
            fn on_error(&self, _: &str) {}
            fn on_cleared(&self) {
                *self.0.lock().unwrap() = true;
            }
        }

        let observer = Arc::new(Cleared::default());
        let corrector = StreamingCorrector::new(
            None,
            DEFAULT_CORRECTION_PROMPT,
            observer.clone(),
            Arc::new(Sink::default()),
        );
        corrector.cleared();
        assert!(*observer.0.lock().unwrap());
        assert_eq!(corrector.instruction(), "Improve grammar and clarity");
    }
}
