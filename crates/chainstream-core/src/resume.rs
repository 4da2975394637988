//! Resumption controller — wraps stream sessions with the restart policy.
//!
//! A run is an explicit loop over sessions. Each session streams a
//! sub-range; on a transient error the next session starts right after the
//! last delivered block, so the handler sees every block of the requested
//! range exactly once, in order. Any other cause ends the run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::completion::{CompletionSignal, Interrupt};
use crate::handler::BlockHandler;
use crate::policy::RestartPolicy;
use crate::session::{StreamSession, DEFAULT_EXIT_GRACE};
use crate::source::BlockSource;
use crate::types::{BlockNumber, BlockRange, FilterExpression, StreamRequest, TerminationCause};

/// Tunables for a [`Resumer`].
#[derive(Debug, Clone)]
pub struct ResumerConfig {
    /// Grace interval each session waits after releasing its resources.
    pub exit_grace: Duration,
    /// Back-off between sessions after a transient error.
    pub restart: RestartPolicy,
}

impl Default for ResumerConfig {
    fn default() -> Self {
        Self {
            exit_grace: DEFAULT_EXIT_GRACE,
            restart: RestartPolicy::default(),
        }
    }
}

impl ResumerConfig {
    pub fn exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }

    pub fn restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }
}

/// Summary of a whole run across all of its sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub cause: TerminationCause,
    /// Number of sessions opened (first one included).
    pub sessions: u32,
    /// Number of restarts after transient errors.
    pub restarts: u32,
    pub last_delivered: Option<BlockNumber>,
    /// Blocks handed to the handler across all sessions.
    pub delivered: u64,
}

/// Drives sessions until the requested range is done or the run fails.
pub struct Resumer {
    source: Arc<dyn BlockSource>,
    config: ResumerConfig,
    interrupt: Interrupt,
}

impl Resumer {
    pub fn new(source: Arc<dyn BlockSource>, config: ResumerConfig, interrupt: Interrupt) -> Self {
        Self {
            source,
            config,
            interrupt,
        }
    }

    pub fn config(&self) -> &ResumerConfig {
        &self.config
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Stream `range` through `handler`; the returned signal is already
    /// resolved with the final session's cause.
    pub async fn run<H>(&self, range: BlockRange, filter: FilterExpression, handler: &mut H) -> CompletionSignal
    where
        H: BlockHandler + ?Sized,
    {
        let completion = CompletionSignal::new();
        let report = self.run_report(range, filter, handler).await;
        completion.resolve(report.cause);
        completion
    }

    /// Like [`run`](Self::run), returning the full report.
    pub async fn run_report<H>(&self, range: BlockRange, filter: FilterExpression, handler: &mut H) -> RunReport
    where
        H: BlockHandler + ?Sized,
    {
        let mut current = range;
        let mut last_delivered: Option<BlockNumber> = None;
        let mut delivered = 0u64;
        let mut sessions = 0u32;
        let mut restarts = 0u32;

        let cause = loop {
            sessions += 1;
            let mut session = StreamSession::new(StreamRequest::new(current, filter.clone()), self.config.exit_grace);
            let report = session
                .run(self.source.as_ref(), handler, &self.interrupt)
                .await;

            delivered += report.delivered;
            if let Some(n) = report.last_delivered {
                last_delivered = Some(last_delivered.map_or(n, |prev| prev.max(n)));
            }

            if !report.cause.is_retryable() {
                break report.cause;
            }

            // Transient: work out where the next session starts.
            let next = match last_delivered {
                Some(n) => match range.resume_from(n) {
                    Some(next) => next,
                    None => {
                        info!(last_delivered = n, "range fully delivered before stream error");
                        break TerminationCause::CleanEnd;
                    }
                },
                None => current,
            };

            let attempt = restarts + 1;
            let Some(delay) = self.config.restart.next_delay(attempt) else {
                warn!(attempt, "restart budget exhausted");
                break report.cause;
            };

            info!(
                attempt,
                resume_from = next.start,
                stop = next.stop,
                remaining = next.len(),
                delay_ms = delay.as_millis() as u64,
                "restarting block stream"
            );

            tokio::select! {
                biased;
                source = self.interrupt.triggered() => {
                    info!(%source, "interrupted during restart back-off");
                    break TerminationCause::Interrupted { source };
                }
                _ = tokio::time::sleep(delay) => {}
            }

            restarts = attempt;
            current = next;
        };

        info!(%cause, sessions, restarts, delivered, "block stream run finished");
        RunReport {
            cause,
            sessions,
            restarts,
            last_delivered,
            delivered,
        }
    }
}
