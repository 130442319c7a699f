//! Storage and transport backends for the notification pipeline.
//!
//! Mirrors the teacher's `forgeerp-infra` split: one module per external
//! collaborator (event log, cursor store, wake bus, read side), plus the
//! aggregator module that owns the merge algorithm and the drain loop.
//! Every trait here has a Postgres-backed implementation and an in-memory
//! one; the in-memory ones exist so the merge algorithm's invariants can be
//! exercised deterministically in tests without a database.

pub mod aggregator;
pub mod cursor_store;
pub mod event_log;
pub mod read_model;
pub mod singleton_lock;
pub mod wake_bus;

pub use cursor_store::{CursorStore, CursorStoreError, InMemoryCursorStore, PostgresCursorStore};
pub use event_log::{EventLog, EventLogError, EventRow, InMemoryEventLog, PostgresEventLog};
pub use singleton_lock::{SingletonGate, SingletonGateError};
