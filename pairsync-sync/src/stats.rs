//! Orchestrator counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::orchestrator::ApplyOutcome;

#[derive(Debug, Default)]
pub(crate) struct SyncStats {
    fetch_rounds: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    superseded: AtomicU64,
    abandoned: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
    peak_active: AtomicU64,
}

/// Point-in-time copy of the orchestrator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub fetch_rounds: u64,
    pub applies_started: u64,
    pub applies_completed: u64,
    pub applies_superseded: u64,
    pub applies_abandoned: u64,
    pub applies_failed: u64,
    /// Requests currently inside the Applying phase.
    pub active_applies: u64,
    /// Highest value `active_applies` ever reached.
    pub peak_active_applies: u64,
}

impl SyncStats {
    pub(crate) fn request_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_fetch_rounds(&self, rounds: usize) {
        self.fetch_rounds.fetch_add(rounds as u64, Ordering::SeqCst);
    }

    pub(crate) fn enter_apply(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn exit_apply(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record(&self, outcome: &ApplyOutcome) {
        let counter = match outcome {
            ApplyOutcome::Completed { .. } => &self.completed,
            ApplyOutcome::Superseded => &self.superseded,
            ApplyOutcome::Abandoned => &self.abandoned,
            ApplyOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fetch_rounds: self.fetch_rounds.load(Ordering::SeqCst),
            applies_started: self.started.load(Ordering::SeqCst),
            applies_completed: self.completed.load(Ordering::SeqCst),
            applies_superseded: self.superseded.load(Ordering::SeqCst),
            applies_abandoned: self.abandoned.load(Ordering::SeqCst),
            applies_failed: self.failed.load(Ordering::SeqCst),
            active_applies: self.active.load(Ordering::SeqCst),
            peak_active_applies: self.peak_active.load(Ordering::SeqCst),
        }
    }
}
