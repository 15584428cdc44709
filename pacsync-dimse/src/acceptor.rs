use crate::error::Result;
use crate::types::{
    AbortReason, AbortSource, DimseStatus, NegotiatedContext, ProposedContext, RejectReason,
    RejectResult, RejectSource, StoredObject,
};
use async_trait::async_trait;
use pacsync_model::AeTitle;

/// An incoming association as presented to the listener before it decides
/// to accept or reject.
#[derive(Debug, Clone)]
pub struct AssociationOffer {
    /// The local identity the peer addressed.
    pub called: AeTitle,
    /// The identity the peer claims for itself.
    pub calling: AeTitle,
    pub proposed: Vec<ProposedContext>,
}

/// One command received on an open association.
#[derive(Debug)]
pub enum InboundCommand {
    Echo {
        message_id: u16,
    },
    Store {
        message_id: u16,
        object: StoredObject,
    },
    /// Orderly release requested by the peer.
    Release,
    /// Abort notification; the association is gone once this is seen.
    Abort {
        source: AbortSource,
        reason: AbortReason,
    },
}

/// Server half of one inbound association.
///
/// The listener drives this through its per-connection state machine:
/// negotiate (accept/reject), then consume commands until release, abort or
/// connection loss.
#[async_trait]
pub trait InboundAssociation: Send {
    fn offer(&self) -> &AssociationOffer;

    /// Complete negotiation, answering each proposed context.
    async fn accept(&mut self, contexts: Vec<NegotiatedContext>) -> Result<()>;

    /// Reject the association and close it.
    async fn reject(
        self: Box<Self>,
        result: RejectResult,
        source: RejectSource,
        reason: RejectReason,
    ) -> Result<()>;

    /// Next command from the peer. `Ok(None)` means the transport closed
    /// without an orderly release.
    async fn next_command(&mut self) -> Result<Option<InboundCommand>>;

    async fn respond_echo(&mut self, message_id: u16, status: DimseStatus) -> Result<()>;

    async fn respond_store(&mut self, message_id: u16, status: DimseStatus) -> Result<()>;

    /// Acknowledge an orderly release.
    async fn confirm_release(&mut self) -> Result<()>;
}

/// Accepts inbound associations for the listener.
#[async_trait]
pub trait AssociationAcceptor: Send + Sync {
    /// Wait for the next incoming association. `Ok(None)` once the
    /// underlying transport has shut down for good.
    async fn accept(&self) -> Result<Option<Box<dyn InboundAssociation>>>;
}
