//! Inbound receive listener.
//!
//! The standing endpoint retrieval pushes land on. Admission policy, the
//! per-connection request loop and atomic persistence live here; the
//! association transport itself arrives through the acceptor seam.

use pacsync_dimse::types::{TransferSyntax, UNCOMPRESSED_TRANSFER_SYNTAXES, lossless_first};
use pacsync_dimse::{
    AbstractSyntax, AssociationAcceptor, AssociationOffer, ContextResult, DimseStatus,
    InboundAssociation, InboundCommand, NegotiatedContext, ProposedContext, RejectReason,
    RejectResult, RejectSource, StoredObject,
};
use pacsync_model::{AeTitle, ReceivedObjectRecord, SopInstanceUid};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Processing-failure status answered when an inbound object cannot be
/// persisted.
const STATUS_PROCESSING_FAILURE: u16 = 0x0110;

/// Outcome of the admission check on one association offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Accept(Vec<NegotiatedContext>),
    Reject {
        result: RejectResult,
        source: RejectSource,
        reason: RejectReason,
    },
}

/// Identity policy, capability negotiation and persistence for inbound
/// transfers.
#[derive(Debug)]
pub struct ReceiveService {
    local_ae: AeTitle,
    remote_ae: AeTitle,
    storage_dir: PathBuf,
    records: Mutex<Vec<ReceivedObjectRecord>>,
}

impl ReceiveService {
    pub fn new(local_ae: AeTitle, remote_ae: AeTitle, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_ae,
            remote_ae,
            storage_dir: storage_dir.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn local_ae(&self) -> &AeTitle {
        &self.local_ae
    }

    /// Apply the identity checks and negotiate every proposed context.
    ///
    /// The called and calling mismatches are rejected permanently with
    /// distinct reasons so the operator can tell which side failed.
    pub fn admit(&self, offer: &AssociationOffer) -> AdmissionDecision {
        if offer.called != self.local_ae {
            return AdmissionDecision::Reject {
                result: RejectResult::Permanent,
                source: RejectSource::ServiceUser,
                reason: RejectReason::CalledAeNotRecognized,
            };
        }
        if offer.calling != self.remote_ae {
            return AdmissionDecision::Reject {
                result: RejectResult::Permanent,
                source: RejectSource::ServiceUser,
                reason: RejectReason::CallingAeNotRecognized,
            };
        }
        AdmissionDecision::Accept(offer.proposed.iter().map(negotiate_context).collect())
    }

    /// Persist one inbound object keyed by its SOP instance UID.
    ///
    /// Failures are answered as a processing-failure status; they are this
    /// object's problem only and never the listener's.
    pub async fn store(&self, object: StoredObject) -> DimseStatus {
        let sop_instance = object.sop_instance.clone();
        match self.persist(object).await {
            Ok(path) => {
                debug!(%sop_instance, path = %path.display(), "inbound object persisted");
                self.records.lock().await.push(ReceivedObjectRecord {
                    sop_instance,
                    path,
                });
                DimseStatus::Success
            }
            Err(e) => {
                error!(%sop_instance, error = %e, "failed to persist inbound object");
                DimseStatus::Failure(STATUS_PROCESSING_FAILURE)
            }
        }
    }

    async fn persist(&self, object: StoredObject) -> std::io::Result<PathBuf> {
        let dir = self.storage_dir.clone();
        let file_name = format!("{}.dcm", object.sop_instance);
        tokio::task::spawn_blocking(move || {
            // Staged through a temp file in the same directory: the final
            // name only ever appears with complete contents, and an
            // interrupted write is discarded with the temp file.
            let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
            staged.write_all(&object.payload)?;
            staged.flush()?;
            let target = dir.join(file_name);
            staged.persist(&target).map_err(|e| e.error)?;
            Ok(target)
        })
        .await
        .map_err(std::io::Error::other)?
    }

    pub async fn records(&self) -> Vec<ReceivedObjectRecord> {
        self.records.lock().await.clone()
    }

    pub async fn record_for(&self, sop_instance: &SopInstanceUid) -> Option<ReceivedObjectRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| &r.sop_instance == sop_instance)
            .cloned()
    }

    pub async fn received_count(&self) -> usize {
        self.records.lock().await.len()
    }
}

/// Negotiate one proposed context: verification gets the small uncompressed
/// set, storage gets every known syntax lossless-first, anything else is
/// refused. Within a service class, our preference order decides.
fn negotiate_context(proposed: &ProposedContext) -> NegotiatedContext {
    let preference: Vec<TransferSyntax> = match &proposed.abstract_syntax {
        AbstractSyntax::Verification => UNCOMPRESSED_TRANSFER_SYNTAXES.to_vec(),
        AbstractSyntax::Storage(_) => lossless_first(),
        AbstractSyntax::Other(_) => {
            return NegotiatedContext {
                id: proposed.id,
                result: ContextResult::AbstractSyntaxNotSupported,
            };
        }
    };
    for ts in preference {
        if proposed
            .transfer_syntaxes
            .iter()
            .any(|offered| offered == ts.uid())
        {
            return NegotiatedContext {
                id: proposed.id,
                result: ContextResult::Accepted(ts.uid().to_owned()),
            };
        }
    }
    NegotiatedContext {
        id: proposed.id,
        result: ContextResult::TransferSyntaxesNotSupported,
    }
}

/// The accept loop. One task per association; a failing session closes
/// itself, never the listener.
pub struct ReceiveListener<A> {
    acceptor: A,
    service: Arc<ReceiveService>,
    shutdown: CancellationToken,
}

impl<A> std::fmt::Debug for ReceiveListener<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveListener")
            .field("local_ae", self.service.local_ae())
            .finish()
    }
}

impl<A: AssociationAcceptor + 'static> ReceiveListener<A> {
    pub fn new(acceptor: A, service: Arc<ReceiveService>, shutdown: CancellationToken) -> Self {
        Self {
            acceptor,
            service,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(local_ae = %self.service.local_ae(), "receive listener accepting associations");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("receive listener shutting down");
                    break;
                }
                accepted = self.acceptor.accept() => match accepted {
                    Ok(Some(association)) => {
                        let service = self.service.clone();
                        tokio::spawn(serve(service, association));
                    }
                    Ok(None) => {
                        info!("association transport closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept association");
                    }
                }
            }
        }
    }
}

async fn serve(service: Arc<ReceiveService>, mut association: Box<dyn InboundAssociation>) {
    let offer = association.offer().clone();
    debug!(called = %offer.called, calling = %offer.calling, "association request received");

    match service.admit(&offer) {
        AdmissionDecision::Reject {
            result,
            source,
            reason,
        } => {
            warn!(
                called = %offer.called,
                calling = %offer.calling,
                %reason,
                "rejecting association"
            );
            if let Err(e) = association.reject(result, source, reason).await {
                debug!(error = %e, "rejection not delivered");
            }
            return;
        }
        AdmissionDecision::Accept(contexts) => {
            if let Err(e) = association.accept(contexts).await {
                warn!(error = %e, "association acceptance not delivered");
                return;
            }
        }
    }

    loop {
        match association.next_command().await {
            Ok(Some(InboundCommand::Echo { message_id })) => {
                if let Err(e) = association
                    .respond_echo(message_id, DimseStatus::Success)
                    .await
                {
                    warn!(error = %e, "echo response not delivered");
                    break;
                }
            }
            Ok(Some(InboundCommand::Store { message_id, object })) => {
                let status = service.store(object).await;
                if let Err(e) = association.respond_store(message_id, status).await {
                    warn!(error = %e, "store response not delivered");
                    break;
                }
            }
            Ok(Some(InboundCommand::Release)) => {
                debug!("release request received");
                if let Err(e) = association.confirm_release().await {
                    debug!(error = %e, "release confirmation not delivered");
                }
                break;
            }
            Ok(Some(InboundCommand::Abort { source, reason })) => {
                error!(%source, %reason, "abort received from peer");
                break;
            }
            Ok(None) => {
                warn!("connection closed without release");
                break;
            }
            Err(e) => {
                error!(error = %e, "association failed");
                break;
            }
        }
    }
}
