//! Core-level error model.

use thiserror::Error;

/// Errors raised by shared core types (ids, partitioning, time bucketing).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A partition id fell outside `[0, P)` for the configured partition count.
    #[error("partition {partition} out of range for P={total}")]
    InvalidPartition { partition: u32, total: u32 },

    /// `ID_ISSUE_WORKER_ID` does not fit in the bits reserved for it.
    #[error("worker id {0} does not fit in the id issuer's worker field")]
    InvalidWorkerId(u32),

    /// A value failed to parse into a strongly-typed id.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
