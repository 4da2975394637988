//! gRPC block source for the `BlockStreamV2/Blocks` service.
//!
//! One TLS channel per session. A forwarding task copies the server stream
//! into a bounded channel so the session reads with back-pressure; aborting
//! that task drops the tonic stream, which cancels the RPC.

use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::SinkExt;
use tokio::task::AbortHandle;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Status};

use chainstream_core::pb::bstream::{BlockResponseV2, BlocksRequestV2};
use chainstream_core::pb::BLOCKS_PATH;
use chainstream_core::{BlockSource, RemoteCode, StreamConnection, StreamError, StreamHandle, StreamRequest};

use crate::auth::ApiTokenStore;
use crate::config::FirehoseConfig;

/// Largest message accepted in either direction.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Responses buffered between the RPC and the session.
pub const RESPONSE_BUFFER: usize = 16;

/// [`BlockSource`] backed by the firehose gRPC endpoint.
pub struct FirehoseSource {
    endpoint: String,
    tokens: Arc<ApiTokenStore>,
}

impl FirehoseSource {
    pub fn new(endpoint: impl Into<String>, tokens: Arc<ApiTokenStore>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tokens,
        }
    }

    pub fn from_config(config: &FirehoseConfig, tokens: Arc<ApiTokenStore>) -> Self {
        Self::new(config.firehose_endpoint(), tokens)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn channel(&self) -> Result<Channel, StreamError> {
        let tls = ClientTlsConfig::new().with_native_roots();
        Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| StreamError::Connect(format!("invalid endpoint {}: {e}", self.endpoint)))?
            .tls_config(tls)
            .map_err(|e| StreamError::Connect(e.to_string()))?
            .connect()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))
    }
}

#[async_trait]
impl BlockSource for FirehoseSource {
    async fn connect(&self, request: &StreamRequest) -> Result<StreamConnection, StreamError> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| StreamError::Auth(e.to_string()))?;
        // Until the handle owns it, any early return (or a dropped future)
        // releases the token.
        let guard = TokenGuard::new(Arc::clone(&self.tokens));
        let channel = self.channel().await?;

        let mut grpc = tonic::client::Grpc::new(channel.clone())
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);
        grpc.ready()
            .await
            .map_err(|e| StreamError::Connect(format!("service not ready: {e}")))?;

        let mut call = tonic::Request::new(request.to_wire());
        let authorization =
            MetadataValue::try_from(token.as_str()).map_err(|e| StreamError::Auth(e.to_string()))?;
        call.metadata_mut().insert("authorization", authorization);

        let codec: ProstCodec<BlocksRequestV2, BlockResponseV2> = ProstCodec::default();
        let mut inbound = grpc
            .server_streaming(call, PathAndQuery::from_static(BLOCKS_PATH), codec)
            .await
            .map_err(|s| status_to_error(&s))?
            .into_inner();

        tracing::info!(endpoint = %self.endpoint, range = %request.range, "firehose stream opened");

        let (mut tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let forward = tokio::spawn(async move {
            loop {
                let item = match inbound.message().await {
                    Ok(Some(response)) => Ok(response),
                    Ok(None) => break,
                    Err(status) => Err(status_to_error(&status)),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        let handle = FirehoseHandle {
            channel: Some(channel),
            tokens: guard.disarm(),
            forward: Some(forward.abort_handle()),
        };
        Ok(StreamConnection::new(Box::pin(rx), Box::new(handle)))
    }
}

/// Releases the token on drop unless disarmed.
struct TokenGuard {
    tokens: Arc<ApiTokenStore>,
    armed: bool,
}

impl TokenGuard {
    fn new(tokens: Arc<ApiTokenStore>) -> Self {
        Self { tokens, armed: true }
    }

    /// Hand the store over to a live handle.
    fn disarm(mut self) -> Arc<ApiTokenStore> {
        self.armed = false;
        Arc::clone(&self.tokens)
    }
}

impl Drop for TokenGuard {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("connect did not complete, releasing token");
            self.tokens.release();
        }
    }
}

struct FirehoseHandle {
    channel: Option<Channel>,
    tokens: Arc<ApiTokenStore>,
    forward: Option<AbortHandle>,
}

impl StreamHandle for FirehoseHandle {
    fn close(&mut self) -> Result<(), StreamError> {
        self.channel.take();
        Ok(())
    }

    fn release(&mut self) -> Result<(), StreamError> {
        self.tokens.release();
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), StreamError> {
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
        Ok(())
    }
}

/// Map a gRPC status to the engine's error type.
pub fn status_to_error(status: &Status) -> StreamError {
    StreamError::remote(remote_code(status.code()), status.message())
}

fn remote_code(code: Code) -> RemoteCode {
    match code {
        Code::Cancelled => RemoteCode::Cancelled,
        Code::InvalidArgument => RemoteCode::InvalidArgument,
        Code::DeadlineExceeded => RemoteCode::DeadlineExceeded,
        Code::Unauthenticated => RemoteCode::Unauthenticated,
        Code::Unavailable => RemoteCode::Unavailable,
        Code::Internal => RemoteCode::Internal,
        Code::Unknown => RemoteCode::Unknown,
        other => RemoteCode::Other(other as i32),
    }
}
