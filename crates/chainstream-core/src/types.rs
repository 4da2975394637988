//! Shared types for the streaming pipeline.

use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::pb::bstream::{BlocksRequestV2, ForkStep};

/// Height of a block on the chain.
pub type BlockNumber = u64;

/// The decoded unit of work handed to a [`crate::BlockHandler`].
pub type Block = crate::pb::eosio::Block;

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive `[start, stop]` range of block numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: BlockNumber,
    pub stop: BlockNumber,
}

impl BlockRange {
    /// Create a range, rejecting `start > stop`.
    pub fn new(start: BlockNumber, stop: BlockNumber) -> Result<Self, StreamError> {
        if start > stop {
            return Err(StreamError::InvalidRange { start, stop });
        }
        Ok(Self { start, stop })
    }

    /// Number of blocks in the range.
    pub fn len(&self) -> u64 {
        self.stop - self.start + 1
    }

    /// Always `false`: a valid range holds at least one block.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, number: BlockNumber) -> bool {
        (self.start..=self.stop).contains(&number)
    }

    /// The remaining range after `last_delivered` has been handled.
    ///
    /// Returns `None` once the stop block itself has been delivered.
    pub fn resume_from(&self, last_delivered: BlockNumber) -> Option<Self> {
        if last_delivered >= self.stop {
            return None;
        }
        let start = (last_delivered + 1).max(self.start);
        Some(Self {
            start,
            stop: self.stop,
        })
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

// ─── FilterExpression ─────────────────────────────────────────────────────────

/// Server-side include/exclude predicates.
///
/// The strings are opaque here; the remote service is the only authority
/// on their syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpression {
    pub include: String,
    pub exclude: String,
}

impl FilterExpression {
    pub fn new(include: impl Into<String>, exclude: impl Into<String>) -> Self {
        Self {
            include: include.into(),
            exclude: exclude.into(),
        }
    }

    pub fn include(mut self, expr: impl Into<String>) -> Self {
        self.include = expr.into();
        self
    }

    pub fn exclude(mut self, expr: impl Into<String>) -> Self {
        self.exclude = expr.into();
        self
    }
}

// ─── StreamRequest ────────────────────────────────────────────────────────────

/// What a session asks its [`crate::BlockSource`] for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub range: BlockRange,
    pub filter: FilterExpression,
}

impl StreamRequest {
    pub fn new(range: BlockRange, filter: FilterExpression) -> Self {
        Self { range, filter }
    }

    /// Wire form of the request. Only irreversible blocks are requested.
    pub fn to_wire(&self) -> BlocksRequestV2 {
        BlocksRequestV2 {
            start_block_num: i64::try_from(self.range.start).unwrap_or(i64::MAX),
            stop_block_num: self.range.stop,
            fork_steps: vec![ForkStep::StepIrreversible as i32],
            include_filter_expr: self.filter.include.clone(),
            exclude_filter_expr: self.filter.exclude.clone(),
            ..Default::default()
        }
    }
}

// ─── Phase ────────────────────────────────────────────────────────────────────

/// Lifecycle phase of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Opening the transport and issuing the request.
    Connecting,
    /// Accepting block, end and error events.
    Streaming,
    /// Releasing resources; no further events are accepted.
    Exiting,
    /// Terminated; the completion signal is resolved.
    Closed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Exiting => write!(f, "exiting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

// ─── TerminationCause ─────────────────────────────────────────────────────────

/// Why a session (or a whole run) ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationCause {
    /// The remote service completed the requested range.
    CleanEnd,
    /// An operator asked the run to stop.
    Interrupted { source: String },
    /// A recoverable stream failure; the run resumes from the checkpoint.
    TransientError { detail: String },
    /// The request itself is unserviceable (e.g. an invalid filter).
    FatalError { detail: String },
    /// A payload did not match the wire contract.
    SchemaMismatch { detail: String },
}

impl TerminationCause {
    /// Returns `true` only for [`TerminationCause::CleanEnd`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::CleanEnd)
    }

    /// Returns `true` if the run may restart after this cause.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientError { .. })
    }
}

impl std::fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CleanEnd => write!(f, "stream ended"),
            Self::Interrupted { source } => write!(f, "interrupted by {source}"),
            Self::TransientError { detail } => write!(f, "stream error: {detail}"),
            Self::FatalError { detail } => write!(f, "fatal stream error: {detail}"),
            Self::SchemaMismatch { detail } => write!(f, "schema mismatch: {detail}"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
