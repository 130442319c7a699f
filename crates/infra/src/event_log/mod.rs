//! The Event Log component (spec §4.2): appends, partitioned reads, purge.

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;
pub use r#trait::{EventLog, EventLogError, EventRow};
