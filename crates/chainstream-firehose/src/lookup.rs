//! Date → block number resolution over the REST lookup service.

use std::sync::Arc;

use chainstream_core::{BlockNumber, BlockRange};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::ApiTokenStore;
use crate::error::LookupError;

/// How the lookup service matches a block to a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gte,
    Gt,
    Lt,
    Lte,
    Eq,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gte => "gte",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
        }
    }
}

/// A block as reported by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub id: String,
    pub num: BlockNumber,
    pub time: String,
}

#[derive(Deserialize)]
struct BlockIdByTimeResponse {
    block: BlockRef,
}

/// The first and last block of a date window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    pub start_block: BlockRef,
    pub stop_block: BlockRef,
}

impl ResolvedRange {
    pub fn new(start_block: BlockRef, stop_block: BlockRef) -> Result<Self, LookupError> {
        if start_block.num > stop_block.num {
            return Err(LookupError::InvalidRange {
                start: start_block.num,
                stop: stop_block.num,
            });
        }
        Ok(Self { start_block, stop_block })
    }

    pub fn range(&self) -> BlockRange {
        BlockRange {
            start: self.start_block.num,
            stop: self.stop_block.num,
        }
    }
}

/// Parse a user-supplied timestamp. Fractional seconds are dropped and a
/// missing offset is read as UTC.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, LookupError> {
    let trimmed = input.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
        let t = t.with_timezone(&Utc);
        return Ok(t.with_nanosecond(0).unwrap_or(t));
    }
    let whole = trimmed
        .split('.')
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches('Z');
    NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| LookupError::InvalidTimestamp(input.to_string()))
}

/// Format a time the way the lookup service expects it.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Client for `/v0/block_id/by_time`.
pub struct BlockTimeClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<ApiTokenStore>,
}

impl BlockTimeClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, tokens: Arc<ApiTokenStore>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn by_time_url(&self) -> String {
        format!("{}/v0/block_id/by_time", self.base_url)
    }

    /// The block matching `time` under `comparator`.
    pub async fn block_id_by_time(
        &self,
        time: &DateTime<Utc>,
        comparator: Comparator,
    ) -> Result<BlockRef, LookupError> {
        let token = self.tokens.token().await?;
        let time = format_timestamp(time);
        let resp = self
            .http
            .get(self.by_time_url())
            .bearer_auth(token)
            .query(&[("time", time.as_str()), ("comparator", comparator.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LookupError::Status { status, body });
        }

        let body: BlockIdByTimeResponse = resp.json().await?;
        tracing::debug!(%time, comparator = comparator.as_str(), num = body.block.num, "resolved block by time");
        Ok(body.block)
    }

    /// Resolve a date window: the first block at or after `start` and the
    /// last block before `stop`.
    pub async fn resolve(&self, start: &str, stop: &str) -> Result<ResolvedRange, LookupError> {
        let start = parse_timestamp(start)?;
        let stop = parse_timestamp(stop)?;

        let result = async {
            let start_block = self.block_id_by_time(&start, Comparator::Gte).await?;
            let stop_block = self.block_id_by_time(&stop, Comparator::Lt).await?;
            Ok::<_, LookupError>((start_block, stop_block))
        }
        .await;
        self.tokens.release();

        let (start_block, stop_block) = result?;
        ResolvedRange::new(start_block, stop_block)
    }
}
