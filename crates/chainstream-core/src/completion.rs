//! Single-assignment completion signal and the operator interrupt.
//!
//! Both are thin wrappers over `tokio::sync::watch` so any number of tasks
//! can observe them, while only the first writer has an effect.

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::TerminationCause;

// ─── CompletionSignal ─────────────────────────────────────────────────────────

/// "The streaming operation is done", carrying the termination cause.
///
/// Write-once: the first [`resolve`](Self::resolve) wins and every later
/// call is a no-op. Clones share the same slot.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    slot: Arc<watch::Sender<Option<TerminationCause>>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Resolve the signal. Returns `true` if this call was the one that won.
    pub fn resolve(&self, cause: TerminationCause) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(cause);
            true
        })
    }

    /// The cause, if already resolved.
    pub fn get(&self) -> Option<TerminationCause> {
        self.slot.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait until the signal is resolved and return its cause.
    pub async fn wait(&self) -> TerminationCause {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(cause) = rx.borrow_and_update().as_ref() {
                return cause.clone();
            }
            // `self` owns the sender, so the channel cannot close under us.
            let _ = rx.changed().await;
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Interrupt ────────────────────────────────────────────────────────────────

/// Operator-initiated stop request (e.g. Ctrl-C).
///
/// Cooperative: sessions observe it between events. The first trigger's
/// source name is kept; later triggers are ignored.
#[derive(Debug, Clone)]
pub struct Interrupt {
    state: Arc<watch::Sender<Option<String>>>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Request a stop. Returns `true` if this was the first trigger.
    pub fn trigger(&self, source: impl Into<String>) -> bool {
        let source = source.into();
        self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(source);
            true
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Name of whoever triggered the interrupt.
    pub fn source(&self) -> Option<String> {
        self.state.borrow().clone()
    }

    /// Resolves once the interrupt has been triggered, yielding its source.
    pub async fn triggered(&self) -> String {
        let mut rx = self.state.subscribe();
        loop {
            if let Some(source) = rx.borrow_and_update().as_ref() {
                return source.clone();
            }
            let _ = rx.changed().await;
        }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
