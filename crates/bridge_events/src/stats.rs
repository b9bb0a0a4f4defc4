//! Dispatch statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the bridge's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Events handed to the bridge
    pub events_dispatched: u64,
    /// Events returned early because no handler was registered
    pub events_short_circuited: u64,
    /// Handler calls made
    pub handler_invocations: u64,
    /// Handler calls that raised or panicked
    pub invocation_failures: u64,
    /// Results rejected for their shape
    pub malformed_results: u64,
    /// Dispatches skipped because the runtime was already in use on the
    /// same thread
    pub reentrant_skips: u64,
    pub token_acquisitions: u64,
    pub token_releases: u64,
}

#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    pub dispatched: AtomicU64,
    pub short_circuited: AtomicU64,
    pub invocations: AtomicU64,
    pub failures: AtomicU64,
    pub malformed: AtomicU64,
    pub reentrant: AtomicU64,
}

impl DispatchCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, acquisitions: u64, releases: u64) -> DispatchStats {
        DispatchStats {
            events_dispatched: self.dispatched.load(Ordering::Relaxed),
            events_short_circuited: self.short_circuited.load(Ordering::Relaxed),
            handler_invocations: self.invocations.load(Ordering::Relaxed),
            invocation_failures: self.failures.load(Ordering::Relaxed),
            malformed_results: self.malformed.load(Ordering::Relaxed),
            reentrant_skips: self.reentrant.load(Ordering::Relaxed),
            token_acquisitions: acquisitions,
            token_releases: releases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_with_field_names() {
        let counters = DispatchCounters::default();
        DispatchCounters::bump(&counters.dispatched);
        DispatchCounters::bump(&counters.short_circuited);

        let json = serde_json::to_value(counters.snapshot(0, 0)).unwrap();
        assert_eq!(json["events_dispatched"], 1);
        assert_eq!(json["events_short_circuited"], 1);
        assert_eq!(json["token_acquisitions"], 0);
    }
}
