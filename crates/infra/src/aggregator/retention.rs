//! Retention-purge gating (spec §4.5, §9 "retention scope of the event-log
//! purge"): event-log purge runs opportunistically after every non-empty
//! drain pass; the notification-row sweep is gated by a processed-event
//! counter so it does not run on every pass.

use std::sync::atomic::{AtomicU64, Ordering};

/// Accumulates processed-event counts across drain passes and reports when
/// the notification retention sweep should run (spec §4.5 step 4: "after a
/// threshold, e.g. >= 100 processed events").
pub struct RetentionGate {
    threshold: u64,
    processed_since_sweep: AtomicU64,
}

impl RetentionGate {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            processed_since_sweep: AtomicU64::new(0),
        }
    }

    /// Records `count` newly processed events; returns `true` exactly when
    /// the threshold is crossed, resetting the counter.
    pub fn record(&self, count: u64) -> bool {
        let total = self.processed_since_sweep.fetch_add(count, Ordering::Relaxed) + count;
        if total >= self.threshold {
            self.processed_since_sweep.store(0, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_threshold_crossed_then_resets() {
        let gate = RetentionGate::new(100);
        for _ in 0..9 {
            assert!(!gate.record(10));
        }
        assert!(gate.record(10));
        assert!(!gate.record(10));
    }
}
