//! Environment configuration for the firehose services.
//!
//! Required: `DFUSE_TOKEN`, `DFUSE_FIREHOSE_NETWORK`, `DFUSE_DFUSE_NETWORK`,
//! `EXIT_TIMEOUT_MS`. Optional: `DFUSE_AUTH_URL`, `FIREHOSE_PORT`,
//! `RESTART_DELAY_MS`.

use std::time::Duration;

use chainstream_core::{RestartPolicy, ResumerConfig};

use crate::error::ConfigError;

pub const DEFAULT_AUTH_URL: &str = "https://auth.eosnation.io/v1/auth/issue";
pub const DEFAULT_FIREHOSE_PORT: u16 = 9000;
pub const DEFAULT_RESTART_DELAY_MS: u64 = 3000;

/// Settings for the streaming and lookup services.
#[derive(Clone, PartialEq, Eq)]
pub struct FirehoseConfig {
    /// API key exchanged for short-lived tokens.
    pub api_key: String,
    /// Host of the gRPC block stream service.
    pub firehose_network: String,
    /// Host of the REST lookup service.
    pub dfuse_network: String,
    /// Grace interval each session waits on exit.
    pub exit_timeout_ms: u64,
    pub auth_url: String,
    pub firehose_port: u16,
    /// Fixed back-off before a restart.
    pub restart_delay_ms: u64,
}

impl FirehoseConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key → value lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &'static str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = required("DFUSE_TOKEN")?;
        let firehose_network = required("DFUSE_FIREHOSE_NETWORK")?;
        let dfuse_network = required("DFUSE_DFUSE_NETWORK")?;
        let exit_timeout_ms = parse("EXIT_TIMEOUT_MS", required("EXIT_TIMEOUT_MS")?)?;

        let auth_url = optional("DFUSE_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string());
        let firehose_port = match optional("FIREHOSE_PORT") {
            Some(v) => parse("FIREHOSE_PORT", v)?,
            None => DEFAULT_FIREHOSE_PORT,
        };
        let restart_delay_ms = match optional("RESTART_DELAY_MS") {
            Some(v) => parse("RESTART_DELAY_MS", v)?,
            None => DEFAULT_RESTART_DELAY_MS,
        };

        Ok(Self {
            api_key,
            firehose_network,
            dfuse_network,
            exit_timeout_ms,
            auth_url,
            firehose_port,
            restart_delay_ms,
        })
    }

    /// `https://{firehose_network}:{port}`
    pub fn firehose_endpoint(&self) -> String {
        format!("https://{}:{}", self.firehose_network, self.firehose_port)
    }

    /// `https://{dfuse_network}`
    pub fn dfuse_base_url(&self) -> String {
        format!("https://{}", self.dfuse_network)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    pub fn resumer_config(&self) -> ResumerConfig {
        ResumerConfig::default()
            .exit_grace(self.exit_grace())
            .restart(RestartPolicy::fixed(Duration::from_millis(self.restart_delay_ms)))
    }
}

impl std::fmt::Debug for FirehoseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirehoseConfig")
            .field("api_key", &"<redacted>")
            .field("firehose_network", &self.firehose_network)
            .field("dfuse_network", &self.dfuse_network)
            .field("exit_timeout_ms", &self.exit_timeout_ms)
            .field("auth_url", &self.auth_url)
            .field("firehose_port", &self.firehose_port)
            .field("restart_delay_ms", &self.restart_delay_ms)
            .finish()
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
