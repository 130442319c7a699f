//! In-memory event log backing deterministic aggregator tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use notifyhub_core::{hash_hex_mod, EventId, IdIssuer, PartitionId, PostId, UserId};
use notifyhub_events::{EventBus, EventPayload, WakeMessage};

use super::r#trait::{EventLog, EventLogError, EventRow};

#[derive(Default)]
struct Partitions {
    rows: HashMap<u32, Vec<EventRow>>,
}

pub struct InMemoryEventLog<B> {
    issuer: IdIssuer,
    total_partitions: u32,
    worker_count: u32,
    bus: B,
    partitions: Arc<Mutex<Partitions>>,
}

impl<B> InMemoryEventLog<B>
where
    B: EventBus<WakeMessage>,
{
    pub fn new(total_partitions: u32, worker_count: u32, bus: B) -> Self {
        Self {
            issuer: IdIssuer::new(0).expect("worker id 0 is always valid"),
            total_partitions,
            worker_count,
            bus,
            partitions: Arc::new(Mutex::new(Partitions::default())),
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

        let mut guard = self.partitions.lock().expect("event log mutex poisoned");
        guard
            .rows
            .entry(partition.as_u32())
            .or_default()
            .push(EventRow {
                event_id: id,
                payload,
            });
        drop(guard);

        let worker_index = partition.as_u32() % self.worker_count;
        let _ = worker_index;
        let _ = self.bus.publish(WakeMessage::new(partition));

        Ok(id)
    }
}

impl<B> EventLog for InMemoryEventLog<B>
where
    B: EventBus<WakeMessage> + Send + Sync,
{
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

    fn record_like(&self, user_id: UserId, post_id: PostId) -> Result<EventId, EventLogError> {
        self.append(EventPayload::Like { user_id, post_id })
    }

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

    fn fetch_batch(
        &self,
        partition: PartitionId,
        after: EventId,
        limit: u32,
    ) -> Result<Vec<EventRow>, EventLogError> {
        let guard = self.partitions.lock().expect("event log mutex poisoned");
        let rows = guard.rows.get(&partition.as_u32()).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| row.event_id > after)
            .take(limit as usize)
            .collect())
    }

    fn purge_old(&self, partition: PartitionId, older_than_ms: i64) -> Result<u64, EventLogError> {
        let cutoff = notifyhub_core::lower_bound_for(older_than_ms);
        let mut guard = self.partitions.lock().expect("event log mutex poisoned");
        let rows = guard.rows.entry(partition.as_u32()).or_default();
        let before = rows.len();
        rows.retain(|row| row.event_id >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}
