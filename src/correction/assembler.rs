// src/correction/assembler.rs
// Turns a completion byte stream into cumulative text with cancellation

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::sse::{SseDecoder, SseFrame};
use crate::error::{MarginError, Result};
use crate::llm::ChatChunk;
use crate::utils::truncate;

/// Callbacks fired while a stream is assembled
pub trait AssemblyObserver: Send + Sync {
    /// Cumulative text so far
    fn on_delta(&self, text: &str);

    fn on_done(&self, text: &str);

    /// Transport failure; fired at most once and nothing follows it
    fn on_error(&self, error: &MarginError);
}

/// How a `consume` call ended
#[derive(Debug)]
pub enum AssemblyOutcome {
    Completed(String),
    Failed(MarginError),
    /// Cancelled externally; holds what was assembled before that
    Cancelled(String),
}

impl AssemblyOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// What a single record contributed
enum Record {
    Delta,
    Done,
    Skip,
}

/// Accumulates `choices[0].delta.content` fragments from `data:` records
#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: SseDecoder,
    text: String,
    skipped: usize,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Records dropped because their payload did not parse
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn apply(&mut self, frame: &SseFrame) -> Record {
        if frame.is_done() {
            return Record::Done;
        }
        match frame.try_parse::<ChatChunk>() {
            Some(chunk) => match chunk.into_content() {
                Some(fragment) if !fragment.is_empty() => {
                    self.text.push_str(&fragment);
                    Record::Delta
                }
                _ => Record::Skip,
            },
            None => {
                self.skipped += 1;
                debug!(record = %frame.preview(), "Skipping malformed stream record");
                Record::Skip
            }
        }
    }

    /// Drive `stream` to its end, the terminal sentinel, an error, or cancellation.
    ///
    /// Once `cancel` fires no further callback runs. Returning drops the
    /// stream, which closes the underlying connection.
    pub async fn consume<S, O>(
        mut self,
        stream: S,
        cancel: &CancellationToken,
        observer: &O,
    ) -> AssemblyOutcome
    where
        S: Stream<Item = Result<Bytes>>,
        O: AssemblyObserver + ?Sized,
    {
        let mut stream = std::pin::pin!(stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return AssemblyOutcome::Cancelled(self.text),
                next = stream.next() => next,
            };

            let frames = match next {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(e)) => {
                    if cancel.is_cancelled() {
                        return AssemblyOutcome::Cancelled(self.text);
                    }
                    warn!(error = %e, received = self.text.len(), "Stream failed");
                    observer.on_error(&e);
                    return AssemblyOutcome::Failed(e);
                }
                None => {
                    // stream ended without the sentinel
                    let tail = self.decoder.finish();
                    if let Some(frame) = tail
                        && matches!(self.apply(&frame), Record::Delta)
                        && !cancel.is_cancelled()
                    {
                        observer.on_delta(&self.text);
                    }
                    return self.finish(cancel, observer);
                }
            };

            for frame in frames {
                if cancel.is_cancelled() {
                    return AssemblyOutcome::Cancelled(self.text);
                }
                match self.apply(&frame) {
                    Record::Delta => observer.on_delta(&self.text),
                    Record::Done => return self.finish(cancel, observer),
                    Record::Skip => {}
                }
            }
        }
    }

    fn finish<O>(self, cancel: &CancellationToken, observer: &O) -> AssemblyOutcome
    where
        O: AssemblyObserver + ?Sized,
    {
        if cancel.is_cancelled() {
            return AssemblyOutcome::Cancelled(self.text);
        }
        debug!(
            chars = self.text.chars().count(),
            skipped = self.skipped,
            preview = %truncate(&self.text, 80),
            "Stream assembled"
        );
        observer.on_done(&self.text);
        AssemblyOutcome::Completed(self.text)
    }
}
