//! Core library for pacsync.
//!
//! Wires the reconciliation pipeline together: the local inventory scanner,
//! the streaming reconciliation engine, the gap-fill planner, the retrieval
//! dispatcher and the inbound receive listener. The protocol itself is
//! consumed through the seams in [`pacsync_dimse`]; everything here is
//! policy and coordination.

pub mod error;
pub mod fetch;
pub mod pass;
pub mod reconcile;
pub mod scan;
pub mod store;

pub use error::{CoreError, Result};
pub use fetch::{DispatchReport, RetrievalDispatcher};
pub use pass::{PassSummary, ReconciliationPass};
pub use reconcile::classify;
pub use scan::{InventoryScanner, ScanReport, SkippedEntry};
pub use store::{ReceiveListener, ReceiveService};
