use notifyhub_core::{EventId, PartitionId};
use notifyhub_events::EventPayload;

/// A row read back from the log by `fetch_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub event_id: EventId,
    pub payload: EventPayload,
}

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// DB timeout, connection reset, or similar — safe to retry.
    #[error("transient event log error: {0}")]
    Transient(String),
    /// The stored payload could not be decoded; indicates corruption or a
    /// schema mismatch, not a transient condition.
    #[error("invalid event log row: {0}")]
    Invalid(String),
    /// The id issuer could not mint an id within the current millisecond.
    /// Per spec §4.1/§7, this is surfaced to the producer, not the consumer.
    #[error("id issuer sequence exhausted, retry shortly")]
    SequenceExhausted,
}

/// Appends events, reads per-partition batches after a cursor, purges old
/// rows (spec §4.2). Implementations choose their own storage; the in-memory
/// one backs unit tests of the aggregator, the Postgres one is production.
pub trait EventLog: Send + Sync {
    fn record_reply(
        &self,
        user_id: notifyhub_core::UserId,
        post_id: notifyhub_core::PostId,
        reply_to_post_id: notifyhub_core::PostId,
    ) -> Result<EventId, EventLogError>;

    fn record_like(
        &self,
        user_id: notifyhub_core::UserId,
        post_id: notifyhub_core::PostId,
    ) -> Result<EventId, EventLogError>;

    fn record_follow(
        &self,
        follower_id: notifyhub_core::UserId,
        followee_id: notifyhub_core::UserId,
    ) -> Result<EventId, EventLogError>;

    fn record_mention(
        &self,
        user_id: notifyhub_core::UserId,
        post_id: notifyhub_core::PostId,
        mentioned_user_id: notifyhub_core::UserId,
    ) -> Result<EventId, EventLogError>;

    /// Rows with `event_id > after`, ascending, capped at `limit`.
    fn fetch_batch(
        &self,
        partition: PartitionId,
        after: EventId,
        limit: u32,
    ) -> Result<Vec<EventRow>, EventLogError>;

    /// Deletes rows in `partition` older than `older_than_ms` (spec §4.2).
    /// Returns the number of rows deleted; a timeout is reported as `Ok(0)`,
    /// not an error, per §9's non-fatal purge-failure note.
    fn purge_old(&self, partition: PartitionId, older_than_ms: i64) -> Result<u64, EventLogError>;
}
