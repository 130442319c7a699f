//! Shared identifiers, the monotonic id issuer, partition hashing and time
//! bucketing used by both the ingestion (producer) side and the consumer
//! (worker) side of the notification pipeline.

pub mod error;
pub mod idgen;
pub mod ids;
pub mod partition;
pub mod time;

pub use error::CoreError;
pub use idgen::{lower_bound_for, timestamp_of, IdIssuer, IdIssuerError};
pub use ids::{EventId, PartitionId, PostId, UserId};
pub use partition::hash_hex_mod;
pub use time::{parse_tz, term_for, ts_seconds};
