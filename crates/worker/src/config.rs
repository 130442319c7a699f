//! Startup configuration (spec §6's configuration table), read once from the
//! environment with a logged fallback for anything optional — mirrors how
//! the teacher's API binary reads `JWT_SECRET`.

use std::env;

use chrono_tz::Tz;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: String,
    pub total_partitions: u32,
    pub worker_count: u32,
    pub batch_size: u32,
    pub cap: usize,
    pub system_tz: Tz,
    pub id_issue_worker_id: u32,
    pub event_log_retention_ms: i64,
    pub notification_retention_ms: i64,
    pub retention_threshold: u64,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional_parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => {
            tracing::warn!(key, "environment variable not set, using default");
            Ok(default)
        }
    }
}

impl WorkerConfig {
    /// Reads every key in spec §6's configuration table, plus the two
    /// connection strings the spec treats as external-collaborator details
    /// (spec §1: the storage engine itself is out of scope, but a process
    /// still needs to know where to find it).
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let redis_url = required("REDIS_URL")?;

        let total_partitions = optional_parsed("EVENT_LOG_PARTITIONS", 4)?;
        let worker_count = optional_parsed("NOTIFICATION_WORKERS", 2)?;
        let batch_size = optional_parsed("NOTIFICATION_BATCH_SIZE", 100)?;
        let cap: usize = optional_parsed("NOTIFICATION_PAYLOAD_RECORDS", 8)?;
        let id_issue_worker_id = optional_parsed("ID_ISSUE_WORKER_ID", 0)?;

        let event_log_retention_days: i64 = optional_parsed("EVENT_LOG_RETENTION_DAYS", 30)?;
        let notification_retention_days: i64 =
            optional_parsed("NOTIFICATION_RETENTION_DAYS", 90)?;
        let retention_threshold = optional_parsed("NOTIFICATION_RETENTION_THRESHOLD", 100)?;

        let system_tz_name = env::var("SYSTEM_TIMEZONE").unwrap_or_else(|_| {
            tracing::warn!("SYSTEM_TIMEZONE not set, defaulting to UTC");
            "UTC".to_string()
        });
        let system_tz = notifyhub_core::parse_tz(&system_tz_name).map_err(|_| ConfigError::Invalid {
            key: "SYSTEM_TIMEZONE",
            value: system_tz_name,
        })?;

        if worker_count == 0 {
            return Err(ConfigError::Invalid {
                key: "NOTIFICATION_WORKERS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url,
            redis_url,
            total_partitions,
            worker_count,
            batch_size,
            cap,
            system_tz,
            id_issue_worker_id,
            event_log_retention_ms: event_log_retention_days * 24 * 3600 * 1000,
            notification_retention_ms: notification_retention_days * 24 * 3600 * 1000,
            retention_threshold,
        })
    }
}
