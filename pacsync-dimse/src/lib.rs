//! DIMSE service vocabulary and session seams for pacsync.
//!
//! The wire level of the exchange protocol (PDU encoding, association
//! negotiation transport, transfer-syntax bargaining mechanics) is an
//! external collaborator. This crate pins down everything pacsync consumes
//! from it: the vocabulary (statuses, priorities, reject and abort reasons,
//! transfer syntaxes, presentation contexts, query records) and the two
//! seams the orchestrator is written against:
//!
//! - [`ArchiveSession`]: the outbound session to the remote archive
//!   (verification, study/series directory queries, retrieval issuance);
//! - [`AssociationAcceptor`] / [`InboundAssociation`]: the inbound side the
//!   receive listener drives its per-connection state machine over.
//!
//! One provider ships in-tree: [`loopback`], an in-process archive driven by
//! a fixture manifest, paired with a channel-backed association transport.
//! Integration tests and configuration drills run against it; a standard
//! upper-layer binding plugs in at the same seams.

pub mod acceptor;
pub mod error;
pub mod loopback;
pub mod session;
pub mod types;

pub use acceptor::{AssociationAcceptor, AssociationOffer, InboundAssociation, InboundCommand};
pub use error::{DimseError, Result};
pub use session::{ArchiveSession, StudyQuery};
pub use types::{
    AbortReason, AbortSource, AbstractSyntax, ContextResult, DimseStatus, MoveReport,
    NegotiatedContext, Priority, ProposedContext, RejectReason, RejectResult, RejectSource,
    RemoteSeriesSummary, RemoteStudySummary, StoredObject, TransferSyntax,
};
