use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{MatchError, MatchResult};

/// Cooperative cancellation flag shared by every stage of one query.
#[derive(Debug, Clone, Default)]
pub struct CancellationGate {
    cancelled: Arc<AtomicBool>,
}

impl CancellationGate {
    pub fn new() -> Self {
        CancellationGate::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn is_same(&self, other: &CancellationGate) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }

    pub fn check(&self) -> MatchResult<()> {
        if self.is_cancelled() {
            Err(MatchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Hands out one gate per query; starting a query cancels the one before it.
#[derive(Debug, Default)]
pub struct QueryTracker {
    current: Mutex<Option<CancellationGate>>,
}

impl QueryTracker {
    pub fn new() -> Self {
        QueryTracker::default()
    }

    pub fn begin(&self) -> CancellationGate {
        let gate = CancellationGate::new();
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = current.replace(gate.clone()) {
            previous.cancel();
        }
        gate
    }

    /// Marks `gate`'s query as done. A newer query is left alone.
    pub fn finish(&self, gate: &CancellationGate) {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.as_ref().map_or(false, |running| running.is_same(gate)) {
            *current = None;
        }
    }

    /// Cancels the running query. Returns false when nothing was running.
    pub fn cancel_current(&self) -> bool {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match current.take() {
            Some(gate) => {
                gate.cancel();
                true
            }
            None => false,
        }
    }
}
