//! Tracing initialisation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Base directive, e.g. "info" or "info,chainstream_core=debug".
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FORMAT=json` selects JSON output.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup("RUST_LOG")
            .or_else(|| lookup("LOG_LEVEL"))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".into());
        let json = lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));
        Self { level, json }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Raise the base level to debug for `--verbose`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = format!("{},chainstream_core=debug,chainstream_firehose=debug", self.level);
        }
        self
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
