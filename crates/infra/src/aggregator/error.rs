/// Logical-skip (spec §7: recipient missing, self-interaction) and retention
/// purge failures (spec §9) are not represented here: both are handled as
/// plain control flow rather than errors — `PartitionDrainLoop::skip` simply
/// advances the cursor with no slot write, and purge failures are caught and
/// logged at the call site (`drain_partition_once`) without ever reaching
/// the caller. Only failures that must abort the current drain pass and
/// retry on the next wake/tick are represented as `AggregatorError`.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// DB timeout, lock-wait exceeded, connection reset — rollback and let
    /// the next wake/tick retry from the unchanged cursor (spec §7).
    #[error("transient aggregator error: {0}")]
    Transient(String),
}
