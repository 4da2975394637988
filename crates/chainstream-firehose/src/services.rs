//! Explicitly constructed service clients for one process.

use std::sync::Arc;
use std::time::Duration;

use chainstream_core::{BlockSource, Interrupt, Resumer};

use crate::auth::ApiTokenStore;
use crate::client::FirehoseSource;
use crate::config::FirehoseConfig;
use crate::error::AuthError;
use crate::lookup::BlockTimeClient;

/// Timeout for REST calls (token issuance and lookups).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The stream source and the lookup client, each with its own token cache.
pub struct FirehoseServices {
    pub config: FirehoseConfig,
    pub source: Arc<FirehoseSource>,
    pub lookup: BlockTimeClient,
}

impl FirehoseServices {
    pub fn new(config: FirehoseConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Http(e.to_string()))?;

        let stream_tokens = Arc::new(ApiTokenStore::new(http.clone(), &config.auth_url, &config.api_key));
        let lookup_tokens = Arc::new(ApiTokenStore::new(http.clone(), &config.auth_url, &config.api_key));

        let source = Arc::new(FirehoseSource::from_config(&config, stream_tokens));
        let lookup = BlockTimeClient::new(http, config.dfuse_base_url(), lookup_tokens);
        Ok(Self { config, source, lookup })
    }

    /// A resumer over the firehose source sharing `interrupt`.
    pub fn resumer(&self, interrupt: Interrupt) -> Resumer {
        let source: Arc<dyn BlockSource> = self.source.clone();
        Resumer::new(source, self.config.resumer_config(), interrupt)
    }
}
