//! The Cursor Store component (spec §4.3): `(consumer, partition)` bookmarks.
//!
//! `save_cursor` is deliberately not exposed as a standalone write here: spec
//! §4.3 requires it run inside the same transaction as the aggregate upsert,
//! so that responsibility lives on `notifyhub_infra::aggregator`'s
//! `NotificationStore::merge_and_advance` / `advance_cursor_only`, which open
//! one transaction covering both the slot write and the cursor write. This
//! module only owns the read path and the raw statement the aggregator's
//! Postgres implementation reuses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::{PgPool, Row};

use notifyhub_core::EventId;

#[derive(Debug, thiserror::Error)]
pub enum CursorStoreError {
    #[error("transient cursor store error: {0}")]
    Transient(String),
}

/// Per-(consumer, partition) "last processed event id" (spec §4.3).
pub trait CursorStore: Send + Sync {
    /// Reads the cursor; if the row is absent, inserts a default-zero row
    /// and returns 0 (upsert-if-missing, per spec §4.2).
    fn load_cursor(&self, consumer: &str, partition: u32) -> Result<EventId, CursorStoreError>;
}

/// Postgres-backed cursor store.
///
/// Schema (spec §6): `cursors(consumer TEXT, partition_id INT, last_event_id
/// INT8, updated_at TIMESTAMPTZ, PK(consumer, partition_id))`.
pub struct PostgresCursorStore {
    pool: Arc<PgPool>,
    runtime: tokio::runtime::Handle,
}

impl PostgresCursorStore {
    /// Must be called from within a tokio runtime (e.g. the worker binary's
    /// `#[tokio::main]` startup path): captures a [`tokio::runtime::Handle`]
    /// so `load_cursor` can bridge to async from the drain loop's plain OS
    /// thread, where `Handle::try_current()` would not find a runtime.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    pub(crate) fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }
}

/// Statement shared with `aggregator::store::PostgresNotificationStore`
/// when it advances the cursor inside its own merge transaction.
pub(crate) const SAVE_CURSOR_SQL: &str = "\
    INSERT INTO cursors (consumer, partition_id, last_event_id, updated_at) \
    VALUES ($1, $2, $3, NOW()) \
    ON CONFLICT (consumer, partition_id) \
    DO UPDATE SET last_event_id = EXCLUDED.last_event_id, updated_at = NOW()";

impl CursorStore for PostgresCursorStore {
    fn load_cursor(&self, consumer: &str, partition: u32) -> Result<EventId, CursorStoreError> {
        let handle = self.runtime.clone();
        let pool = self.pool.clone();
        let consumer = consumer.to_string();
        let partition_i32 = partition as i32;

        handle.block_on(async move {
            let row = sqlx::query(
                "SELECT last_event_id FROM cursors WHERE consumer = $1 AND partition_id = $2",
            )
            .bind(&consumer)
            .bind(partition_i32)
            .fetch_optional(&*pool)
            .await
            .map_err(|e| CursorStoreError::Transient(format!("load_cursor: {e}")))?;

            if let Some(row) = row {
                let last: i64 = row
                    .try_get("last_event_id")
                    .map_err(|e| CursorStoreError::Transient(format!("load_cursor row: {e}")))?;
                return Ok(EventId::from_i64(last));
            }

            sqlx::query(SAVE_CURSOR_SQL)
                .bind(&consumer)
                .bind(partition_i32)
                .bind(0i64)
                .execute(&*pool)
                .await
                .map_err(|e| CursorStoreError::Transient(format!("load_cursor insert default: {e}")))?;

            Ok(EventId::from_raw(0))
        })
    }
}

/// In-memory cursor store for tests; shares its backing map with
/// `aggregator::store::InMemoryNotificationStore` so the two stay consistent
/// the way a single Postgres transaction would.
#[derive(Default)]
pub struct InMemoryCursorStore {
    pub(crate) cursors: Arc<Mutex<HashMap<(String, u32), EventId>>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shared(cursors: Arc<Mutex<HashMap<(String, u32), EventId>>>) -> Self {
        Self { cursors }
    }
}

impl CursorStore for InMemoryCursorStore {
    fn load_cursor(&self, consumer: &str, partition: u32) -> Result<EventId, CursorStoreError> {
        let mut guard = self.cursors.lock().expect("cursor store mutex poisoned");
        Ok(*guard
            .entry((consumer.to_string(), partition))
            .or_insert_with(|| EventId::from_raw(0)))
    }
}
