//! Error classification and restart back-off.
//!
//! Which stream errors end a run and which ones are retried is policy, kept
//! apart from the session mechanics so the rules can change without touching
//! connection lifecycle code.

use std::time::Duration;

use crate::error::{RemoteCode, StreamError};

/// Details string the service reports for a stream we cancelled ourselves.
pub const CANCELLED_MARKER: &str = "Cancelled";

/// Substrings the service uses when it cannot build the requested filter.
pub const FILTER_MARKERS: &[&str] = &["unable to create preproc function", "unable to construct filter"];

/// How the session should react to a stream error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Echo of an exit already in progress; discard.
    Cancellation,
    /// Retrying cannot succeed.
    Fatal,
    /// Resume from the last delivered block after a back-off.
    Transient,
}

/// Classify a stream error.
///
/// Structured codes are consulted first; the marker strings are a fallback
/// for transports that only surface free text.
pub fn classify(error: &StreamError) -> ErrorClass {
    if let StreamError::Remote {
        code: RemoteCode::Cancelled,
        ..
    } = error
    {
        return ErrorClass::Cancellation;
    }
    let details = error.details();
    if details == CANCELLED_MARKER {
        return ErrorClass::Cancellation;
    }
    if FILTER_MARKERS.iter().any(|m| details.contains(m)) {
        return ErrorClass::Fatal;
    }
    ErrorClass::Transient
}

// ─── RestartPolicy ────────────────────────────────────────────────────────────

/// Back-off between sessions after a transient error.
///
/// The default is a fixed 3 s delay with no restart ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    /// Delay before the first restart.
    pub delay: Duration,
    /// Multiplier applied on each further restart (`1.0` = fixed delay).
    pub multiplier: f64,
    /// Cap on the delay when `multiplier > 1.0`.
    pub max_delay: Duration,
    /// Maximum restarts per run; `None` retries forever.
    pub max_restarts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            multiplier: 1.0,
            max_delay: Duration::from_secs(60),
            max_restarts: None,
        }
    }
}

impl RestartPolicy {
    /// Fixed delay, unbounded restarts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    /// Returns the delay before the `attempt`-th restart (1-based), or `None`
    /// once the restart budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_restarts {
            if attempt > max {
                return None;
            }
        }
        if self.multiplier <= 1.0 {
            return Some(self.delay);
        }
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_ms = self.delay.as_millis() as f64 * self.multiplier.powi(exp);
        let capped = base_ms.min(self.max_delay.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }
}
