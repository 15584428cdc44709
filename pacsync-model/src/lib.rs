//! Shared data model for the pacsync reconciliation pipeline.
//!
//! Everything in this crate is plain data: strongly typed identifiers for
//! the study/series/instance hierarchy, the query time window, the immutable
//! inventory snapshot produced by the scanner, and the verdict/plan types
//! that flow from the reconciliation engine to the retrieval dispatcher.

pub mod error;
pub mod ids;
pub mod inventory;
pub mod verdict;
pub mod window;

pub use error::{ModelError, Result};
pub use ids::{AeTitle, SeriesUid, SopInstanceUid, StudyUid};
pub use inventory::{InventorySnapshot, LocalInventoryEntry};
pub use verdict::{
    FetchPlan, ReceivedObjectRecord, ReconciliationVerdict, SeriesGap, StudyStatus,
};
pub use window::TimeWindow;
