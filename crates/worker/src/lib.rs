//! Wiring for the `notifyhub-worker` binary: one process, `N` in-process
//! drain loops, singleton-gated (spec §5).
//!
//! Split from `main.rs` the way the teacher splits `api::app::build_app`
//! from `api::main`, so the wiring can be exercised without a process exit.

pub mod config;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use notifyhub_core::IdIssuer;
use notifyhub_infra::aggregator::{DrainLoopConfig, DrainLoopHandle, PartitionDrainLoop};
use notifyhub_infra::read_model::{PostgresPostLookup, PostgresUserLookup};
use notifyhub_infra::wake_bus::RedisWakeBus;
use notifyhub_infra::{PostgresCursorStore, PostgresEventLog, SingletonGate};

pub use config::{ConfigError, WorkerConfig};

type Loop = PartitionDrainLoop<
    PostgresEventLog<RedisWakeBus>,
    PostgresCursorStore,
    notifyhub_infra::aggregator::PostgresNotificationStore,
    PostgresPostLookup,
    PostgresUserLookup,
>;

/// What startup produced: the singleton gate (must outlive every drain loop)
/// and the set of spawned loop handles, one per in-process worker.
pub struct RunningWorker {
    _gate: SingletonGate,
    handles: Vec<DrainLoopHandle>,
}

impl RunningWorker {
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown();
        }
    }
}

/// Acquires the singleton gate and spawns `config.worker_count` drain loops,
/// one per `partition mod worker_count` bucket (spec §5). Returns `Ok(None)`
/// when the gate could not be acquired — the caller exits 0 (spec §6's CLI
/// surface), not an error.
pub async fn start(config: &WorkerConfig) -> anyhow::Result<Option<RunningWorker>> {
    let gate = match SingletonGate::try_acquire(&config.database_url).await? {
        Some(gate) => gate,
        None => return Ok(None),
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let issuer = Arc::new(IdIssuer::new(config.id_issue_worker_id)?);

    // Used only to satisfy `PostgresEventLog`'s generic bus parameter; this
    // process never appends events, so the bus's publish half is dead code
    // here, not a correctness concern.
    let event_log_bus = RedisWakeBus::new(&config.redis_url, config.worker_count, 0)?;
    let event_log = Arc::new(PostgresEventLog::new(
        pool.clone(),
        issuer,
        config.total_partitions,
        config.worker_count,
        event_log_bus,
    ));

    let cursor_store = Arc::new(PostgresCursorStore::new(pool.clone()));
    let notification_store = Arc::new(notifyhub_infra::aggregator::PostgresNotificationStore::new(
        pool.clone(),
    ));
    let posts = Arc::new(PostgresPostLookup::new(pool.clone()));
    let users = Arc::new(PostgresUserLookup::new(pool));

    let mut handles = Vec::with_capacity(config.worker_count as usize);
    for worker_index in 0..config.worker_count {
        let owned_partitions: Vec<_> = (0..config.total_partitions)
            .filter(|p| p % config.worker_count == worker_index)
            .map(notifyhub_core::PartitionId::new_unchecked)
            .collect();

        let drain_config = DrainLoopConfig {
            consumer: "notification".to_string(),
            owned_partitions,
            batch_size: config.batch_size,
            cap: config.cap,
            system_tz: config.system_tz,
            event_log_retention_ms: config.event_log_retention_ms,
            notification_retention_ms: config.notification_retention_ms,
            retention_threshold: config.retention_threshold,
        };

        let drain_loop: Arc<Loop> = Arc::new(PartitionDrainLoop::new(
            drain_config,
            event_log.clone(),
            cursor_store.clone(),
            notification_store.clone(),
            posts.clone(),
            users.clone(),
        ));

        let worker_bus: RedisWakeBus =
            RedisWakeBus::new(&config.redis_url, config.worker_count, worker_index)?;
        handles.push(drain_loop.spawn(worker_bus));

        tracing::info!(worker_index, "notification drain loop started");
    }

    Ok(Some(RunningWorker { _gate: gate, handles }))
}
