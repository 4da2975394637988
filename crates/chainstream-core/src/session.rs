//! Stream session — one live stream for one block range.
//!
//! # State machine
//! ```text
//! Connecting ──ok──▶ Streaming ──end / error / interrupt / mismatch──▶ Exiting ──grace──▶ Closed
//!      └──────────────── connect error / interrupt ──────────────────────▲
//! ```
//!
//! Events are taken one at a time from a single `select!` loop, so the
//! handler never sees two blocks concurrently. The first event that moves
//! the phase out of `Streaming` decides the termination cause; everything
//! arriving afterwards is a no-op.

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::completion::{CompletionSignal, Interrupt};
use crate::decode::decode_block;
use crate::error::StreamError;
use crate::handler::BlockHandler;
use crate::pb::bstream::BlockResponseV2;
use crate::policy::{classify, ErrorClass};
use crate::source::{BlockSource, ResponseStream, StreamHandle};
use crate::types::{BlockNumber, Phase, StreamRequest, TerminationCause};

/// Default pause between releasing resources and reporting completion.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_millis(3000);

/// One input to the session state machine.
#[derive(Debug)]
pub enum SessionEvent {
    /// A response item arrived on the stream.
    Block(BlockResponseV2),
    /// The remote closed the stream after the last block.
    End,
    /// The stream failed.
    Error(StreamError),
    /// The operator interrupt fired; carries its source.
    Interrupt(String),
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub cause: TerminationCause,
    /// Highest block number handed to the handler, if any.
    pub last_delivered: Option<BlockNumber>,
    /// Number of blocks handed to the handler.
    pub delivered: u64,
    /// Release steps run on exit (close, release, cancel); 0 when no
    /// connection was ever opened.
    pub releases: u32,
}

/// Mutable run-time state of one stream.
pub struct StreamSession {
    request: StreamRequest,
    last_delivered: Option<BlockNumber>,
    delivered: u64,
    phase: Phase,
    handle: Option<Box<dyn StreamHandle>>,
    exit_grace: Duration,
    completion: CompletionSignal,
    /// A cancellation-marked error was skipped while streaming.
    cancellation_skipped: bool,
}

impl StreamSession {
    pub fn new(request: StreamRequest, exit_grace: Duration) -> Self {
        Self {
            request,
            last_delivered: None,
            delivered: 0,
            phase: Phase::Connecting,
            handle: None,
            exit_grace,
            completion: CompletionSignal::new(),
            cancellation_skipped: false,
        }
    }

    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_delivered(&self) -> Option<BlockNumber> {
        self.last_delivered
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// This session's completion signal; resolves when the phase reaches `Closed`.
    pub fn completion(&self) -> CompletionSignal {
        self.completion.clone()
    }

    /// Connect, stream until a termination event, then run the exit sequence.
    pub async fn run<H>(
        &mut self,
        source: &dyn BlockSource,
        handler: &mut H,
        interrupt: &Interrupt,
    ) -> SessionReport
    where
        H: BlockHandler + ?Sized,
    {
        info!(range = %self.request.range, "connecting block stream");

        let connected = tokio::select! {
            biased;
            source = interrupt.triggered() => Err(TerminationCause::Interrupted { source }),
            result = source.connect(&self.request) => {
                result.map_err(|e| {
                    warn!(error = %e, "block stream connect failed");
                    cause_for_error(&e).unwrap_or(TerminationCause::TransientError {
                        detail: e.details(),
                    })
                })
            }
        };

        let mut responses = match connected {
            Ok(connection) => {
                self.handle = Some(connection.handle);
                self.phase = Phase::Streaming;
                info!(range = %self.request.range, "block stream open");
                connection.responses
            }
            Err(cause) => {
                self.begin_exit();
                return self.exit(cause, None).await;
            }
        };

        let cause = loop {
            let event = tokio::select! {
                biased;
                source = interrupt.triggered() => SessionEvent::Interrupt(source),
                item = responses.next() => match item {
                    Some(Ok(response)) => SessionEvent::Block(response),
                    Some(Err(e)) => SessionEvent::Error(e),
                    None => SessionEvent::End,
                },
            };
            if let Some(cause) = self.handle_event(event, handler) {
                break cause;
            }
        };

        self.exit(cause, Some(responses)).await
    }

    /// Apply one event.
    ///
    /// Returns the termination cause when this event moved the session into
    /// `Exiting`. Events delivered in any phase other than `Streaming` are
    /// ignored.
    pub fn handle_event<H>(&mut self, event: SessionEvent, handler: &mut H) -> Option<TerminationCause>
    where
        H: BlockHandler + ?Sized,
    {
        if self.phase != Phase::Streaming {
            debug!(phase = %self.phase, ?event, "event after exit began, ignoring");
            return None;
        }

        let cause = match event {
            SessionEvent::Block(response) => self.deliver(response, handler)?,
            SessionEvent::End => self.end_cause(),
            SessionEvent::Error(e) => match cause_for_error(&e) {
                Some(cause) => {
                    warn!(
                        error = %e,
                        last_delivered = ?self.last_delivered,
                        "block stream error"
                    );
                    cause
                }
                None => {
                    debug!(error = %e, "cancellation echo, ignoring");
                    self.cancellation_skipped = true;
                    return None;
                }
            },
            SessionEvent::Interrupt(source) => TerminationCause::Interrupted { source },
        };

        if self.begin_exit() {
            Some(cause)
        } else {
            None
        }
    }

    /// A stream that closes after a skipped cancellation without reaching
    /// the stop block was cut short, not completed.
    fn end_cause(&self) -> TerminationCause {
        let reached_stop = self
            .last_delivered
            .is_some_and(|n| n >= self.request.range.stop);
        if self.cancellation_skipped && !reached_stop {
            warn!(
                last_delivered = ?self.last_delivered,
                stop = self.request.range.stop,
                "stream closed after cancellation before the stop block"
            );
            return TerminationCause::TransientError {
                detail: "stream closed after cancellation before the stop block".into(),
            };
        }
        TerminationCause::CleanEnd
    }

    /// Decode and hand one block to the handler. Returns a cause only when
    /// the payload violates the wire contract.
    fn deliver<H>(&mut self, response: BlockResponseV2, handler: &mut H) -> Option<TerminationCause>
    where
        H: BlockHandler + ?Sized,
    {
        let Some(payload) = response.block else {
            return Some(TerminationCause::SchemaMismatch {
                detail: "response carried no block payload".into(),
            });
        };
        match decode_block(&payload) {
            Ok(block) => {
                let number = BlockNumber::from(block.number);
                if !self.request.range.contains(number) {
                    warn!(number, range = %self.request.range, "block outside requested range");
                }
                self.last_delivered = Some(self.last_delivered.map_or(number, |n| n.max(number)));
                self.delivered += 1;
                debug!(number, "block");
                handler.on_block(block);
                None
            }
            Err(e) => {
                warn!(error = %e, "rejecting block payload");
                Some(TerminationCause::SchemaMismatch {
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Move to `Exiting`. Only the first caller gets `true`.
    fn begin_exit(&mut self) -> bool {
        match self.phase {
            Phase::Connecting | Phase::Streaming => {
                self.phase = Phase::Exiting;
                true
            }
            Phase::Exiting | Phase::Closed => false,
        }
    }

    /// Release resources, wait the grace interval, close and resolve.
    async fn exit(&mut self, cause: TerminationCause, responses: Option<ResponseStream>) -> SessionReport {
        info!(%cause, last_delivered = ?self.last_delivered, "exiting block stream");

        let mut releases = 0u32;
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.close() {
                warn!(error = %e, "closing transport failed");
            }
            releases += 1;
            if let Err(e) = handle.release() {
                warn!(error = %e, "releasing token failed");
            }
            releases += 1;
            if let Err(e) = handle.cancel() {
                warn!(error = %e, "cancelling request failed");
            }
            releases += 1;
        }
        drop(responses);

        info!(grace_ms = self.exit_grace.as_millis() as u64, "exiting after grace period");
        tokio::time::sleep(self.exit_grace).await;

        self.phase = Phase::Closed;
        self.completion.resolve(cause.clone());
        SessionReport {
            cause,
            last_delivered: self.last_delivered,
            delivered: self.delivered,
            releases,
        }
    }
}

/// Map a stream error to a termination cause; `None` means "ignore".
fn cause_for_error(error: &StreamError) -> Option<TerminationCause> {
    match classify(error) {
        ErrorClass::Cancellation => None,
        ErrorClass::Fatal => Some(TerminationCause::FatalError {
            detail: error.details(),
        }),
        ErrorClass::Transient => Some(TerminationCause::TransientError {
            detail: error.details(),
        }),
    }
}
