//! The Notification Aggregator (spec §4.5): the consumer half of the
//! pipeline. Resolves recipients, classifies events into slots, merges with
//! dedup/cap/count invariants, advances the cursor atomically with the
//! merge, and drives the per-partition drain loop.

mod error;
mod merge;
mod recipient;
mod retention;
mod slot;
mod store;
mod worker;

pub use error::AggregatorError;
pub use recipient::{is_self_interaction, resolve_recipient};
pub use retention::RetentionGate;
pub use slot::{AggregatePayload, IncomingRecord, PostRecord, SlotKey, StoredSlot, UserRecord};
pub use store::{InMemoryNotificationStore, MergeOutcome, NotificationStore, PostgresNotificationStore};
pub use worker::{DrainLoopConfig, DrainLoopHandle, PartitionDrainLoop};
