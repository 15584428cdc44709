use crate::types::{AbortReason, AbortSource, RejectReason, RejectResult, RejectSource};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DimseError {
    #[error("association rejected ({result}, {source}): {reason}")]
    Rejected {
        result: RejectResult,
        source: RejectSource,
        reason: RejectReason,
    },

    #[error("association aborted by {source}: {reason}")]
    Aborted {
        source: AbortSource,
        reason: AbortReason,
    },

    /// Non-success status or absent dataset on a directory query record.
    /// Fatal to the pass that issued the query.
    #[error("directory query failed: {0}")]
    QueryFailed(String),

    /// The peer refused a retrieval command. Logged by the dispatcher,
    /// which then carries on with the remainder of the plan.
    #[error("retrieval refused: {0}")]
    MoveRefused(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("no transport provider available for '{0}'")]
    NoProvider(String),

    #[error("fixture error: {0}")]
    Fixture(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DimseError>;
