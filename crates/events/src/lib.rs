//! Event payload shapes and the pub/sub "wake" mechanics (spec §3, §4.4).
//!
//! This crate makes no storage assumptions (mirrors the teacher's
//! `forgeerp-events`): it defines the tagged-union payload, the generic
//! event-bus abstraction, an in-memory bus for tests, and the wake-message
//! encoding producers and workers both need to agree on.

pub mod bus;
pub mod in_memory_bus;
pub mod payload;
pub mod wake;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::InMemoryEventBus;
pub use payload::EventPayload;
pub use wake::WakeMessage;
