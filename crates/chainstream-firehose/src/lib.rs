//! chainstream-firehose — firehose gRPC transport and REST helpers.
//!
//! - [`FirehoseSource`]: `BlockSource` over `dfuse.bstream.v1.BlockStreamV2/Blocks`
//! - [`ApiTokenStore`]: API key → short-lived token, cached until expiry
//! - [`BlockTimeClient`]: date → block number lookups
//! - [`FirehoseConfig`]: environment configuration

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod lookup;
pub mod services;

pub use auth::{ApiToken, ApiTokenStore};
pub use client::{status_to_error, FirehoseSource};
pub use config::FirehoseConfig;
pub use error::{AuthError, ConfigError, LookupError};
pub use lookup::{parse_timestamp, BlockRef, BlockTimeClient, Comparator, ResolvedRange};
pub use services::FirehoseServices;
