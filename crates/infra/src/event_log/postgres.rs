//! Postgres-backed event log.
//!
//! Schema (spec §6): `events(partition_id INT, event_id INT8, payload JSON)`
//! with index `(partition_id, event_id)`. `event_id` is stored as `INT8`;
//! the top bit of our 64-bit id is always zero (see `notifyhub_core::ids`)
//! so the cast to `i64` never truncates.

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use notifyhub_core::{hash_hex_mod, EventId, IdIssuer, PartitionId, PostId, UserId};
use notifyhub_events::{EventBus, EventPayload, WakeMessage};

use super::r#trait::{EventLog, EventLogError, EventRow};

fn map_sqlx_error(op: &'static str, err: sqlx::Error) -> EventLogError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            EventLogError::Transient(format!("{op}: {err}"))
        }
        _ => EventLogError::Transient(format!("{op}: {err}")),
    }
}

/// Appends to, and reads from, the `events` table; publishes a wake hint on
/// the worker's bus after each successful append (spec §4.2, §4.4).
///
/// Generic over the bus implementation rather than a trait object: the bus
/// type is fixed for the life of the process (Redis in production, in-memory
/// in tests), so there is no need to pay for dynamic dispatch.
#[derive(Clone)]
pub struct PostgresEventLog<B> {
    pool: Arc<PgPool>,
    runtime: tokio::runtime::Handle,
    issuer: Arc<IdIssuer>,
    total_partitions: u32,
    worker_count: u32,
    bus: B,
}

impl<B> PostgresEventLog<B>
where
    B: EventBus<WakeMessage>,
{
    /// Must be called from within a tokio runtime: captures a
    /// [`tokio::runtime::Handle`] up front so the drain loop's plain OS
    /// thread can bridge to async without relying on `Handle::try_current()`.
    pub fn new(
        pool: PgPool,
        issuer: Arc<IdIssuer>,
        total_partitions: u32,
        worker_count: u32,
        bus: B,
    ) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime: tokio::runtime::Handle::current(),
            issuer,
            total_partitions,
            worker_count,
            bus,
        }
    }

    fn append(&self, payload: EventPayload) -> Result<EventId, EventLogError> {
        let partition = PartitionId::new_unchecked(hash_hex_mod(
            payload.affinity_key(),
            self.total_partitions,
        ));
        let id = self
            .issuer
            .issue()
            .map_err(|_| EventLogError::SequenceExhausted)?;

        let json = serde_json::to_value(&payload)
            .map_err(|e| EventLogError::Invalid(format!("payload serialization: {e}")))?;

        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let event_id_i64 = id.as_i64();
        let partition_i32 = partition.as_u32() as i32;

        handle.block_on(async move {
            sqlx::query(
                "INSERT INTO events (partition_id, event_id, payload) VALUES ($1, $2, $3)",
            )
            .bind(partition_i32)
            .bind(event_id_i64)
            .bind(&json)
            .execute(&*pool)
            .await
            .map_err(|e| map_sqlx_error("append", e))
        })?;

        // Publish is best-effort: a dropped wake never loses work because
        // the drain loop also runs on startup and a periodic tick (§9).
        let worker_index = partition.as_u32() % self.worker_count;
        if let Err(err) = self.bus.publish(WakeMessage::new(partition)) {
            warn!(?err, worker_index, "wake publish failed, relying on tick/startup drain");
        }

        Ok(id)
    }
}

impl<B> EventLog for PostgresEventLog<B>
where
    B: EventBus<WakeMessage> + Send + Sync,
{
    #[instrument(skip(self, user_id, post_id, reply_to_post_id), err)]
    fn record_reply(
        &self,
        user_id: UserId,
        post_id: PostId,
        reply_to_post_id: PostId,
    ) -> Result<EventId, EventLogError> {
        self.append(EventPayload::Reply {
            user_id,
            post_id,
            reply_to_post_id,
        })
    }

    #[instrument(skip(self, user_id, post_id), err)]
    fn record_like(&self, user_id: UserId, post_id: PostId) -> Result<EventId, EventLogError> {
        self.append(EventPayload::Like { user_id, post_id })
    }

    #[instrument(skip(self, follower_id, followee_id), err)]
    fn record_follow(
        &self,
        follower_id: UserId,
        followee_id: UserId,
    ) -> Result<EventId, EventLogError> {
        self.append(EventPayload::Follow {
            follower_id,
            followee_id,
        })
    }

    #[instrument(skip(self, user_id, post_id, mentioned_user_id), err)]
    fn record_mention(
        &self,
        user_id: UserId,
        post_id: PostId,
        mentioned_user_id: UserId,
    ) -> Result<EventId, EventLogError> {
        self.append(EventPayload::Mention {
            user_id,
            post_id,
            mentioned_user_id,
        })
    }

    #[instrument(skip(self), err)]
    fn fetch_batch(
        &self,
        partition: PartitionId,
        after: EventId,
        limit: u32,
    ) -> Result<Vec<EventRow>, EventLogError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let partition_i32 = partition.as_u32() as i32;
        let after_i64 = after.as_i64();

        handle.block_on(async move {
            let rows = sqlx::query(
                "SELECT event_id, payload FROM events \
                 WHERE partition_id = $1 AND event_id > $2 \
                 ORDER BY event_id ASC LIMIT $3",
            )
            .bind(partition_i32)
            .bind(after_i64)
            .bind(limit as i64)
            .fetch_all(&*pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_batch", e))?;

            rows.into_iter()
                .map(|row| {
                    let event_id_i64: i64 = row
                        .try_get("event_id")
                        .map_err(|e| EventLogError::Invalid(format!("event_id column: {e}")))?;
                    let json: serde_json::Value = row
                        .try_get("payload")
                        .map_err(|e| EventLogError::Invalid(format!("payload column: {e}")))?;
                    let payload: EventPayload = serde_json::from_value(json)
                        .map_err(|e| EventLogError::Invalid(format!("payload decode: {e}")))?;
                    Ok(EventRow {
                        event_id: EventId::from_i64(event_id_i64),
                        payload,
                    })
                })
                .collect()
        })
    }

    #[instrument(skip(self), err)]
    fn purge_old(&self, partition: PartitionId, older_than_ms: i64) -> Result<u64, EventLogError> {
        let cutoff = notifyhub_core::lower_bound_for(older_than_ms);
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let partition_i32 = partition.as_u32() as i32;
        let cutoff_i64 = cutoff.as_i64();

        handle.block_on(async move {
            let mut tx = match pool.begin().await {
                Ok(tx) => tx,
                Err(e) => return Err(map_sqlx_error("purge_old.begin", e)),
            };

            if sqlx::query("SET LOCAL statement_timeout = '10s'")
                .execute(&mut *tx)
                .await
                .is_err()
            {
                let _ = tx.rollback().await;
                warn!("purge_old: failed to set statement_timeout, skipping this pass");
                return Ok(0);
            }

            let result = sqlx::query(
                "DELETE FROM events WHERE partition_id = $1 AND event_id < $2",
            )
            .bind(partition_i32)
            .bind(cutoff_i64)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(res) => {
                    if tx.commit().await.is_err() {
                        warn!("purge_old: commit failed, reporting zero deleted");
                        return Ok(0);
                    }
                    Ok(res.rows_affected())
                }
                Err(e) => {
                    let _ = tx.rollback().await;
                    warn!(error = %e, "purge_old: statement failed or timed out, leaving rows for next attempt");
                    Ok(0)
                }
            }
        })
    }
}
