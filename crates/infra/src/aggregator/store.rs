//! The `NotificationStore`: the atomic unit of work spec §4.5.2/§5 describe
//! as "one transaction that SELECTs FOR UPDATE, upserts, and advances the
//! cursor". Folding the cursor write into this trait (rather than exposing
//! a generic "caller-provided transaction" across crate boundaries) is how
//! this crate satisfies spec §4.3's "same transaction as the domain write"
//! requirement without leaking `sqlx::Transaction` into the `EventLog`'s
//! public API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::{PgPool, Row};

use notifyhub_core::EventId;

use super::error::AggregatorError;
use super::merge::merge_slot;
use super::slot::{AggregatePayload, IncomingRecord, SlotKey, StoredSlot};
use crate::cursor_store::SAVE_CURSOR_SQL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// The slot key collided with a row of the other payload shape; should
    /// not happen with well-formed data, but merge degrades to a fresh slot
    /// rather than erroring (see `merge::merge_user_slot`/`merge_post_slot`).
    MergedOverShapeMismatch,
}

pub trait NotificationStore: Send + Sync {
    fn get_slot(&self, key: &SlotKey) -> Result<Option<StoredSlot>, AggregatorError>;

    /// The atomic step 3.a–3.e/3.f of spec §4.5: locks the slot row, merges
    /// `incoming` into it, writes it back, advances the cursor — all inside
    /// one transaction.
    fn merge_and_advance(
        &self,
        key: &SlotKey,
        incoming: IncomingRecord,
        ms: i64,
        cap: usize,
        consumer: &str,
        partition: u32,
        event_id: EventId,
    ) -> Result<MergeOutcome, AggregatorError>;

    /// The Logical-skip path (spec §7): no slot mutation, but the cursor
    /// still advances, inside its own (no-op besides the cursor) transaction.
    fn advance_cursor_only(
        &self,
        consumer: &str,
        partition: u32,
        event_id: EventId,
    ) -> Result<(), AggregatorError>;

    /// Deletes slot rows older than `older_than_ms` (spec §4.5.2 retention
    /// paragraph). Bounded by a statement timeout; failures are reported as
    /// `Ok(0)`, never propagated (spec §7).
    fn purge_stale(&self, older_than_ms: i64) -> Result<u64, AggregatorError>;
}

fn encode_updated_at_ms(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now)
}

/// Postgres-backed store. Schema (spec §6): `notifications(user_id TEXT,
/// slot TEXT, term TEXT, is_read BOOL, payload JSON, updated_at
/// TIMESTAMPTZ, PK(user_id, slot, term))`.
pub struct PostgresNotificationStore {
    pool: Arc<PgPool>,
    runtime: tokio::runtime::Handle,
}

impl PostgresNotificationStore {
    /// Must be called from within a tokio runtime; see
    /// `cursor_store::PostgresCursorStore::new` for why the handle is
    /// captured here rather than fetched fresh inside each sync method.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime: tokio::runtime::Handle::current(),
        }
    }
}

impl NotificationStore for PostgresNotificationStore {
    fn get_slot(&self, key: &SlotKey) -> Result<Option<StoredSlot>, AggregatorError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let recipient = key.recipient.as_str().to_string();
        let slot = key.slot.clone();
        let term = key.term.clone();

        handle.block_on(async move {
            let row = sqlx::query(
                "SELECT is_read, payload FROM notifications \
                 WHERE user_id = $1 AND slot = $2 AND term = $3",
            )
            .bind(&recipient)
            .bind(&slot)
            .bind(&term)
            .fetch_optional(&*pool)
            .await
            .map_err(|e| AggregatorError::Transient(format!("get_slot: {e}")))?;

            row.map(|row| decode_row(row)).transpose()
        })
    }

    fn merge_and_advance(
        &self,
        key: &SlotKey,
        incoming: IncomingRecord,
        ms: i64,
        cap: usize,
        consumer: &str,
        partition: u32,
        event_id: EventId,
    ) -> Result<MergeOutcome, AggregatorError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let recipient = key.recipient.as_str().to_string();
        let slot = key.slot.clone();
        let term = key.term.clone();
        let consumer = consumer.to_string();

        handle.block_on(async move {
            let mut tx = pool
                .begin()
                .await
                .map_err(|e| AggregatorError::Transient(format!("merge_and_advance.begin: {e}")))?;

            let existing_row = sqlx::query(
                "SELECT is_read, payload FROM notifications \
                 WHERE user_id = $1 AND slot = $2 AND term = $3 FOR UPDATE",
            )
            .bind(&recipient)
            .bind(&slot)
            .bind(&term)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AggregatorError::Transient(format!("merge_and_advance.select: {e}")))?;

            let existing = existing_row.map(decode_row).transpose()?;
            let merged = merge_slot(existing, incoming, ms, cap);
            let payload_json = serde_json::to_value(&merged.payload)
                .map_err(|e| AggregatorError::Transient(format!("payload serialization: {e}")))?;
            let updated_at = encode_updated_at_ms(merged.updated_at);

            sqlx::query(
                "INSERT INTO notifications (user_id, slot, term, is_read, payload, updated_at) \
                 VALUES ($1, $2, $3, false, $4, $5) \
                 ON CONFLICT (user_id, slot, term) \
                 DO UPDATE SET is_read = false, payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at",
            )
            .bind(&recipient)
            .bind(&slot)
            .bind(&term)
            .bind(&payload_json)
            .bind(updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AggregatorError::Transient(format!("merge_and_advance.upsert: {e}")))?;

            sqlx::query(SAVE_CURSOR_SQL)
                .bind(&consumer)
                .bind(partition as i32)
                .bind(event_id.as_i64())
                .execute(&mut *tx)
                .await
                .map_err(|e| AggregatorError::Transient(format!("merge_and_advance.cursor: {e}")))?;

            tx.commit()
                .await
                .map_err(|e| AggregatorError::Transient(format!("merge_and_advance.commit: {e}")))?;

            Ok(MergeOutcome::Merged)
        })
    }

    fn advance_cursor_only(
        &self,
        consumer: &str,
        partition: u32,
        event_id: EventId,
    ) -> Result<(), AggregatorError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let consumer = consumer.to_string();

        handle.block_on(async move {
            let mut tx = pool
                .begin()
                .await
                .map_err(|e| AggregatorError::Transient(format!("advance_cursor_only.begin: {e}")))?;

            sqlx::query(SAVE_CURSOR_SQL)
                .bind(&consumer)
                .bind(partition as i32)
                .bind(event_id.as_i64())
                .execute(&mut *tx)
                .await
                .map_err(|e| AggregatorError::Transient(format!("advance_cursor_only.cursor: {e}")))?;

            tx.commit()
                .await
                .map_err(|e| AggregatorError::Transient(format!("advance_cursor_only.commit: {e}")))
        })
    }

    fn purge_stale(&self, older_than_ms: i64) -> Result<u64, AggregatorError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let cutoff = encode_updated_at_ms(older_than_ms);

        handle.block_on(async move {
            let mut tx = match pool.begin().await {
                Ok(tx) => tx,
                Err(_) => return Ok(0),
            };

            if sqlx::query("SET LOCAL statement_timeout = '10s'")
                .execute(&mut *tx)
                .await
                .is_err()
            {
                let _ = tx.rollback().await;
                return Ok(0);
            }

            match sqlx::query("DELETE FROM notifications WHERE updated_at < $1")
                .bind(cutoff)
                .execute(&mut *tx)
                .await
            {
                Ok(res) => {
                    if tx.commit().await.is_err() {
                        return Ok(0);
                    }
                    Ok(res.rows_affected())
                }
                Err(_) => {
                    let _ = tx.rollback().await;
                    Ok(0)
                }
            }
        })
    }
}

fn decode_row(row: sqlx::postgres::PgRow) -> Result<StoredSlot, AggregatorError> {
    let is_read: bool = row
        .try_get("is_read")
        .map_err(|e| AggregatorError::Transient(format!("slot row is_read: {e}")))?;
    let json: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| AggregatorError::Transient(format!("slot row payload: {e}")))?;
    let payload: AggregatePayload = serde_json::from_value(json)
        .map_err(|e| AggregatorError::Transient(format!("slot payload decode: {e}")))?;
    Ok(StoredSlot {
        is_read,
        payload,
        updated_at: 0,
    })
}

/// In-memory store for tests; shares a cursor map with
/// `cursor_store::InMemoryCursorStore` so callers can observe both halves of
/// the "atomic" write the way a real transaction would expose them.
pub struct InMemoryNotificationStore {
    slots: Mutex<HashMap<(String, String, String), StoredSlot>>,
    cursors: Arc<Mutex<HashMap<(String, u32), EventId>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            cursors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A cursor store that reads from the same backing map this store
    /// writes cursor advances to.
    pub fn cursor_store(&self) -> crate::cursor_store::InMemoryCursorStore {
        crate::cursor_store::InMemoryCursorStore::shared(self.cursors.clone())
    }

    fn key(key: &SlotKey) -> (String, String, String) {
        (key.recipient.as_str().to_string(), key.slot.clone(), key.term.clone())
    }
}

impl Default for InMemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn get_slot(&self, key: &SlotKey) -> Result<Option<StoredSlot>, AggregatorError> {
        Ok(self
            .slots
            .lock()
            .expect("notification store mutex poisoned")
            .get(&Self::key(key))
            .cloned())
    }

    fn merge_and_advance(
        &self,
        key: &SlotKey,
        incoming: IncomingRecord,
        ms: i64,
        cap: usize,
        consumer: &str,
        partition: u32,
        event_id: EventId,
    ) -> Result<MergeOutcome, AggregatorError> {
        let mut slots = self.slots.lock().expect("notification store mutex poisoned");
        let mut cursors = self.cursors.lock().expect("cursor store mutex poisoned");

        let existing = slots.get(&Self::key(key)).cloned();
        let merged = merge_slot(existing, incoming, ms, cap);
        slots.insert(Self::key(key), merged);
        cursors.insert((consumer.to_string(), partition), event_id);

        Ok(MergeOutcome::Merged)
    }

    fn advance_cursor_only(
        &self,
        consumer: &str,
        partition: u32,
        event_id: EventId,
    ) -> Result<(), AggregatorError> {
        self.cursors
            .lock()
            .expect("cursor store mutex poisoned")
            .insert((consumer.to_string(), partition), event_id);
        Ok(())
    }

    fn purge_stale(&self, older_than_ms: i64) -> Result<u64, AggregatorError> {
        let mut slots = self.slots.lock().expect("notification store mutex poisoned");
        let before = slots.len();
        slots.retain(|_, slot| slot.updated_at >= older_than_ms);
        Ok((before - slots.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifyhub_core::UserId;

    #[test]
    fn in_memory_store_shares_cursor_state_with_its_cursor_store() {
        let store = InMemoryNotificationStore::new();
        let cursor_store = store.cursor_store();
        store
            .advance_cursor_only("notification", 0, EventId::from_raw(42))
            .unwrap();
        assert_eq!(
            crate::CursorStore::load_cursor(&cursor_store, "notification", 0).unwrap(),
            EventId::from_raw(42)
        );
    }

    #[test]
    fn purge_stale_removes_only_old_rows() {
        let store = InMemoryNotificationStore::new();
        let key = SlotKey::follow(UserId::new("u1"), "2025-06-01".to_string());
        store
            .merge_and_advance(
                &key,
                IncomingRecord::User(crate::aggregator::UserRecord {
                    user_id: UserId::new("u2"),
                    user_nickname: "nick".to_string(),
                    ts: 1,
                }),
                1_000,
                3,
                "notification",
                0,
                EventId::from_raw(1),
            )
            .unwrap();
        assert_eq!(store.purge_stale(500).unwrap(), 0);
        assert_eq!(store.purge_stale(2_000).unwrap(), 1);
    }
}
