//! The `BlockSource` trait — the seam between the engine and a transport.
//!
//! A source opens one stream per call to [`BlockSource::connect`]. The
//! returned [`StreamConnection`] splits into the response stream, which the
//! session polls, and a [`StreamHandle`] holding the resources the session
//! must release when it exits.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::StreamError;
use crate::pb::bstream::BlockResponseV2;
use crate::types::StreamRequest;

/// Responses for one stream, in upstream order.
///
/// Implementations must be back-pressured: the producer does not run ahead
/// of the consumer by more than a small bounded buffer.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<BlockResponseV2, StreamError>> + Send>>;

/// Resources owned by one live stream.
///
/// Each step is called at most once, in the order `close`, `release`,
/// `cancel`, and a failure in one step does not prevent the others.
pub trait StreamHandle: Send {
    /// Close the transport connection.
    fn close(&mut self) -> Result<(), StreamError>;

    /// Release the upstream authorization token.
    fn release(&mut self) -> Result<(), StreamError>;

    /// Cancel the in-flight request if it is still live.
    fn cancel(&mut self) -> Result<(), StreamError>;
}

/// An opened stream: responses plus the handle that tears it down.
pub struct StreamConnection {
    pub responses: ResponseStream,
    pub handle: Box<dyn StreamHandle>,
}

impl StreamConnection {
    pub fn new(responses: ResponseStream, handle: Box<dyn StreamHandle>) -> Self {
        Self { responses, handle }
    }
}

/// Abstracts over block stream backends.
///
/// The trait is object-safe and is normally held as `Arc<dyn BlockSource>`.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Open a stream for `request` and issue it to the remote service.
    async fn connect(&self, request: &StreamRequest) -> Result<StreamConnection, StreamError>;
}
