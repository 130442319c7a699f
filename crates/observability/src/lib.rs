//! Tracing/logging setup shared by `notifyhub-worker` (spec's ambient
//! stack: the spec treats observability as non-goal-exempt, §9).

/// Initialize process-wide observability (tracing/logging).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;
