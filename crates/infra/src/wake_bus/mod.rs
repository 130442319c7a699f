//! Wake bus backends (spec §4.4, §6): transport for "partition `p` has new
//! work" hints. [`notifyhub_events::InMemoryEventBus`] already satisfies
//! [`notifyhub_events::EventBus`] for [`notifyhub_events::WakeMessage`] and
//! is used directly for tests and single-process deployments; this module
//! only adds the Redis-backed production transport.

#[cfg(feature = "redis")]
mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisWakeBus, RedisWakeBusError};
