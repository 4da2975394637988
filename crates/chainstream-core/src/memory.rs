//! In-memory block source for tests and demos.
//!
//! Each call to [`BlockSource::connect`] consumes the next [`Script`]: a
//! list of steps replayed as the response stream. The source records every
//! request it receives and counts the release steps run on its handles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;

use crate::decode::encode_block;
use crate::error::StreamError;
use crate::pb::bstream::{BlockResponseV2, ForkStep};
use crate::source::{BlockSource, StreamConnection, StreamHandle};
use crate::types::{Block, BlockNumber, StreamRequest};

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Deliver this block in the canonical envelope.
    Block(Block),
    /// Deliver a raw response as-is.
    Response(BlockResponseV2),
    /// Fail the stream.
    Error(StreamError),
    /// Never yield again (until the stream is dropped).
    Pending,
}

/// What a single `connect` call does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    connect_error: Option<StreamError>,
    steps: Vec<ScriptedStep>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// A script whose `connect` call fails.
    pub fn connect_error(error: StreamError) -> Self {
        Self {
            connect_error: Some(error),
            steps: vec![],
        }
    }

    /// Deliver blocks `from..=to` with no payload beyond the number.
    pub fn blocks(mut self, from: BlockNumber, to: BlockNumber) -> Self {
        for n in from..=to {
            self.steps.push(ScriptedStep::Block(numbered_block(n)));
        }
        self
    }

    pub fn block(mut self, block: Block) -> Self {
        self.steps.push(ScriptedStep::Block(block));
        self
    }

    pub fn response(mut self, response: BlockResponseV2) -> Self {
        self.steps.push(ScriptedStep::Response(response));
        self
    }

    pub fn error(mut self, error: StreamError) -> Self {
        self.steps.push(ScriptedStep::Error(error));
        self
    }

    /// Keep the stream open indefinitely after the previous steps.
    pub fn pending(mut self) -> Self {
        self.steps.push(ScriptedStep::Pending);
        self
    }
}

/// A block carrying only its number (and a derived id).
pub fn numbered_block(number: BlockNumber) -> Block {
    let number = u32::try_from(number).unwrap_or(u32::MAX);
    Block {
        id: format!("{number:08x}"),
        number,
        ..Default::default()
    }
}

/// Counts of release steps run across all handles of a source.
#[derive(Debug, Default)]
pub struct ReleaseCounts {
    close: AtomicU32,
    release: AtomicU32,
    cancel: AtomicU32,
}

impl ReleaseCounts {
    pub fn close(&self) -> u32 {
        self.close.load(Ordering::SeqCst)
    }

    pub fn release(&self) -> u32 {
        self.release.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) -> u32 {
        self.cancel.load(Ordering::SeqCst)
    }
}

struct ScriptedHandle {
    counts: Arc<ReleaseCounts>,
    fail_close: bool,
}

impl StreamHandle for ScriptedHandle {
    fn close(&mut self) -> Result<(), StreamError> {
        self.counts.close.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(StreamError::Release("scripted close failure".into()));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), StreamError> {
        self.counts.release.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), StreamError> {
        self.counts.cancel.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory [`BlockSource`] replaying queued scripts.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<StreamRequest>>,
    counts: Arc<ReleaseCounts>,
    fail_close: bool,
}

impl ScriptedSource {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Make every handle's `close` step fail (the other steps still succeed).
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn counts(&self) -> &ReleaseCounts {
        &self.counts
    }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn connect(&self, request: &StreamRequest) -> Result<StreamConnection, StreamError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| StreamError::Connect("no script left".into()))?;

        if let Some(e) = script.connect_error {
            return Err(e);
        }

        let steps: VecDeque<ScriptedStep> = script.steps.into();
        let responses = stream::unfold(steps, |mut steps| async move {
            match steps.pop_front()? {
                ScriptedStep::Block(block) => {
                    let response = BlockResponseV2 {
                        block: Some(encode_block(&block)),
                        step: ForkStep::StepIrreversible as i32,
                        cursor: block.id.clone(),
                    };
                    Some((Ok(response), steps))
                }
                ScriptedStep::Response(response) => Some((Ok(response), steps)),
                ScriptedStep::Error(e) => Some((Err(e), steps)),
                ScriptedStep::Pending => {
                    futures::future::pending::<()>().await;
                    None
                }
            }
        });

        let handle = ScriptedHandle {
            counts: Arc::clone(&self.counts),
            fail_close: self.fail_close,
        };
        Ok(StreamConnection::new(Box::pin(responses), Box::new(handle)))
    }
}
