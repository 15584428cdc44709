//! In-process provider for both session seams.
//!
//! `association_channel` wires a connector to an acceptor over tokio
//! channels, standing in for the upper-layer transport. [`LoopbackArchive`]
//! implements [`ArchiveSession`] from a fixture manifest and routes
//! retrievals by opening loopback associations to the configured
//! destination, which is exactly what a push-style retrieval does to the
//! real listener. Integration tests and configuration drills run on this
//! provider end to end.

use crate::acceptor::{AssociationAcceptor, AssociationOffer, InboundAssociation, InboundCommand};
use crate::error::{DimseError, Result};
use crate::session::{ArchiveSession, StudyQuery};
use crate::types::{
    AbortReason, AbortSource, DimseStatus, MoveReport, NegotiatedContext, Priority,
    ProposedContext, RejectReason, RejectResult, RejectSource, RemoteSeriesSummary,
    RemoteStudySummary, StoredObject, UNCOMPRESSED_TRANSFER_SYNTAXES,
};
use crate::types::{AbstractSyntax, EXPLICIT_VR_LE, IMPLICIT_VR_LE};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::stream::{self, BoxStream, StreamExt};
use pacsync_model::{AeTitle, SeriesUid, SopInstanceUid, StudyUid};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::debug;

const DEFAULT_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";

enum Decision {
    Accepted(Vec<NegotiatedContext>),
    Rejected {
        result: RejectResult,
        source: RejectSource,
        reason: RejectReason,
    },
}

enum Reply {
    Echo(DimseStatus),
    Store(DimseStatus),
    ReleaseConfirmed,
}

struct Handshake {
    offer: AssociationOffer,
    decision_tx: oneshot::Sender<Decision>,
    command_rx: mpsc::Receiver<InboundCommand>,
    reply_tx: mpsc::Sender<Reply>,
}

/// Build a connected connector/acceptor pair.
pub fn association_channel(capacity: usize) -> (LoopbackConnector, LoopbackAcceptor) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        LoopbackConnector { tx },
        LoopbackAcceptor { rx: Mutex::new(rx) },
    )
}

/// Client half of the loopback transport: opens associations against the
/// paired acceptor.
#[derive(Clone)]
pub struct LoopbackConnector {
    tx: mpsc::Sender<Handshake>,
}

impl std::fmt::Debug for LoopbackConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackConnector").finish()
    }
}

impl LoopbackConnector {
    /// Request an association; resolves once the acceptor has negotiated.
    pub async fn connect(&self, offer: AssociationOffer) -> Result<LoopbackClientAssociation> {
        let (decision_tx, decision_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::channel(8);
        let (reply_tx, reply_rx) = mpsc::channel(8);
        self.tx
            .send(Handshake {
                offer,
                decision_tx,
                command_rx,
                reply_tx,
            })
            .await
            .map_err(|_| DimseError::ConnectionLost("acceptor has shut down".into()))?;
        match decision_rx.await {
            Ok(Decision::Accepted(negotiated)) => Ok(LoopbackClientAssociation {
                negotiated,
                command_tx,
                reply_rx,
                next_message_id: 1,
            }),
            Ok(Decision::Rejected {
                result,
                source,
                reason,
            }) => Err(DimseError::Rejected {
                result,
                source,
                reason,
            }),
            Err(_) => Err(DimseError::ConnectionLost(
                "association dropped during negotiation".into(),
            )),
        }
    }
}

/// Client half of one open loopback association.
pub struct LoopbackClientAssociation {
    negotiated: Vec<NegotiatedContext>,
    command_tx: mpsc::Sender<InboundCommand>,
    reply_rx: mpsc::Receiver<Reply>,
    next_message_id: u16,
}

impl std::fmt::Debug for LoopbackClientAssociation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackClientAssociation")
            .field("negotiated", &self.negotiated.len())
            .finish()
    }
}

impl LoopbackClientAssociation {
    pub fn negotiated(&self) -> &[NegotiatedContext] {
        &self.negotiated
    }

    fn take_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        id
    }

    async fn send(&mut self, command: InboundCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| DimseError::ConnectionLost("association closed by peer".into()))
    }

    async fn recv(&mut self) -> Result<Reply> {
        self.reply_rx
            .recv()
            .await
            .ok_or_else(|| DimseError::ConnectionLost("association closed by peer".into()))
    }

    pub async fn echo(&mut self) -> Result<DimseStatus> {
        let message_id = self.take_message_id();
        self.send(InboundCommand::Echo { message_id }).await?;
        match self.recv().await? {
            Reply::Echo(status) => Ok(status),
            _ => Err(DimseError::ConnectionLost(
                "unexpected reply to verification request".into(),
            )),
        }
    }

    pub async fn store(&mut self, object: StoredObject) -> Result<DimseStatus> {
        let message_id = self.take_message_id();
        self.send(InboundCommand::Store { message_id, object }).await?;
        match self.recv().await? {
            Reply::Store(status) => Ok(status),
            _ => Err(DimseError::ConnectionLost(
                "unexpected reply to store request".into(),
            )),
        }
    }

    /// Orderly release; resolves once the peer confirms.
    pub async fn release(mut self) -> Result<()> {
        self.send(InboundCommand::Release).await?;
        match self.recv().await? {
            Reply::ReleaseConfirmed => Ok(()),
            _ => Err(DimseError::ConnectionLost(
                "unexpected reply to release request".into(),
            )),
        }
    }

    /// Abort without release.
    pub async fn abort(mut self, reason: AbortReason) {
        let _ = self
            .send(InboundCommand::Abort {
                source: AbortSource::ServiceUser,
                reason,
            })
            .await;
    }
}

/// Server half of the loopback transport.
pub struct LoopbackAcceptor {
    rx: Mutex<mpsc::Receiver<Handshake>>,
}

impl std::fmt::Debug for LoopbackAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackAcceptor").finish()
    }
}

#[async_trait]
impl AssociationAcceptor for LoopbackAcceptor {
    async fn accept(&self) -> Result<Option<Box<dyn InboundAssociation>>> {
        let handshake = self.rx.lock().await.recv().await;
        Ok(handshake.map(|h| {
            Box::new(LoopbackServerAssociation {
                offer: h.offer,
                decision_tx: Some(h.decision_tx),
                command_rx: h.command_rx,
                reply_tx: h.reply_tx,
            }) as Box<dyn InboundAssociation>
        }))
    }
}

struct LoopbackServerAssociation {
    offer: AssociationOffer,
    decision_tx: Option<oneshot::Sender<Decision>>,
    command_rx: mpsc::Receiver<InboundCommand>,
    reply_tx: mpsc::Sender<Reply>,
}

#[async_trait]
impl InboundAssociation for LoopbackServerAssociation {
    fn offer(&self) -> &AssociationOffer {
        &self.offer
    }

    async fn accept(&mut self, contexts: Vec<NegotiatedContext>) -> Result<()> {
        let tx = self.decision_tx.take().ok_or_else(|| {
            DimseError::ConnectionLost("negotiation already completed".into())
        })?;
        tx.send(Decision::Accepted(contexts))
            .map_err(|_| DimseError::ConnectionLost("peer gone before acceptance".into()))
    }

    async fn reject(
        mut self: Box<Self>,
        result: RejectResult,
        source: RejectSource,
        reason: RejectReason,
    ) -> Result<()> {
        if let Some(tx) = self.decision_tx.take() {
            // The peer may already be gone; a reject has nowhere to land then.
            let _ = tx.send(Decision::Rejected {
                result,
                source,
                reason,
            });
        }
        Ok(())
    }

    async fn next_command(&mut self) -> Result<Option<InboundCommand>> {
        Ok(self.command_rx.recv().await)
    }

    async fn respond_echo(&mut self, _message_id: u16, status: DimseStatus) -> Result<()> {
        self.reply_tx
            .send(Reply::Echo(status))
            .await
            .map_err(|_| DimseError::ConnectionLost("peer gone before echo response".into()))
    }

    async fn respond_store(&mut self, _message_id: u16, status: DimseStatus) -> Result<()> {
        self.reply_tx
            .send(Reply::Store(status))
            .await
            .map_err(|_| DimseError::ConnectionLost("peer gone before store response".into()))
    }

    async fn confirm_release(&mut self) -> Result<()> {
        self.reply_tx
            .send(Reply::ReleaseConfirmed)
            .await
            .map_err(|_| DimseError::ConnectionLost("peer gone before release response".into()))
    }
}

/// One object the fixture archive holds and can push on retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectFixture {
    pub sop_instance_uid: SopInstanceUid,
    #[serde(default = "default_sop_class")]
    pub sop_class_uid: String,
    /// File whose bytes are pushed on retrieval, relative to the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

fn default_sop_class() -> String {
    DEFAULT_SOP_CLASS.to_owned()
}

impl ObjectFixture {
    pub fn inline(sop_instance_uid: SopInstanceUid, payload: Vec<u8>) -> Self {
        Self {
            sop_instance_uid,
            sop_class_uid: default_sop_class(),
            path: None,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SeriesFixture {
    pub series_uid: SeriesUid,
    /// Remote-reported per-series count; `None` simulates a vendor that
    /// omits the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_instances: Option<u32>,
    #[serde(default)]
    pub objects: Vec<ObjectFixture>,
}

impl SeriesFixture {
    pub fn new(series_uid: SeriesUid) -> Self {
        Self {
            series_uid,
            reported_instances: None,
            objects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StudyFixture {
    pub study_uid: StudyUid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_at: Option<NaiveDateTime>,
    /// Remote-reported study-level count; `None` simulates a vendor that
    /// omits the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_instances: Option<u32>,
    #[serde(default)]
    pub series: Vec<SeriesFixture>,
    /// Refuse retrieval commands for this study.
    #[serde(default)]
    pub refuse_moves: bool,
    /// Fail the series-level query scoped to this study.
    #[serde(default)]
    pub fail_series_query: bool,
}

impl StudyFixture {
    pub fn new(study_uid: StudyUid) -> Self {
        Self {
            study_uid,
            patient_id: None,
            study_at: None,
            reported_instances: None,
            series: Vec::new(),
            refuse_moves: false,
            fail_series_query: false,
        }
    }

    fn objects(&self) -> impl Iterator<Item = &ObjectFixture> {
        self.series.iter().flat_map(|s| s.objects.iter())
    }
}

/// Manifest describing the simulated remote archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArchiveFixture {
    /// AE title the archive claims when pushing retrieved objects.
    pub aet: String,
    #[serde(default)]
    pub studies: Vec<StudyFixture>,
    /// Fail the study-level query with this message (pass-fatal path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_study_query: Option<String>,
}

impl ArchiveFixture {
    pub fn new(aet: impl Into<String>) -> Self {
        Self {
            aet: aet.into(),
            studies: Vec::new(),
            fail_study_query: None,
        }
    }

    /// Load a manifest and resolve object payload files relative to it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| DimseError::Fixture(format!("reading {}: {e}", path.display())))?;
        let mut fixture: ArchiveFixture = serde_yaml::from_str(&raw)
            .map_err(|e| DimseError::Fixture(format!("parsing {}: {e}", path.display())))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for study in &mut fixture.studies {
            for series in &mut study.series {
                for object in &mut series.objects {
                    if let Some(rel) = &object.path {
                        let resolved = base.join(rel);
                        object.payload = fs::read(&resolved).map_err(|e| {
                            DimseError::Fixture(format!(
                                "reading object payload {}: {e}",
                                resolved.display()
                            ))
                        })?;
                    }
                }
            }
        }
        Ok(fixture)
    }
}

/// The simulated remote archive: answers directory queries from its fixture
/// and pushes objects to a registered destination on retrieval.
pub struct LoopbackArchive {
    aet: AeTitle,
    fixture: ArchiveFixture,
    destinations: HashMap<String, LoopbackConnector>,
}

impl std::fmt::Debug for LoopbackArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackArchive")
            .field("aet", &self.aet)
            .field("studies", &self.fixture.studies.len())
            .finish()
    }
}

impl LoopbackArchive {
    pub fn new(fixture: ArchiveFixture) -> Result<Self> {
        let aet = AeTitle::new(&fixture.aet)
            .map_err(|e| DimseError::Fixture(format!("archive aet: {e}")))?;
        Ok(Self {
            aet,
            fixture,
            destinations: HashMap::new(),
        })
    }

    /// Register a move destination the archive can push to.
    pub fn add_destination(&mut self, ae: AeTitle, connector: LoopbackConnector) {
        self.destinations.insert(ae.as_str().to_owned(), connector);
    }

    fn study(&self, uid: &StudyUid) -> Option<&StudyFixture> {
        self.fixture.studies.iter().find(|s| &s.study_uid == uid)
    }

    fn storage_offer(&self, destination: &AeTitle, objects: &[StoredObject]) -> AssociationOffer {
        let mut proposed = vec![ProposedContext {
            id: 1,
            abstract_syntax: AbstractSyntax::Verification,
            transfer_syntaxes: UNCOMPRESSED_TRANSFER_SYNTAXES
                .iter()
                .map(|ts| ts.uid().to_owned())
                .collect(),
        }];
        let mut id = 3u8;
        let mut seen = Vec::new();
        for object in objects {
            if seen.contains(&object.sop_class_uid) {
                continue;
            }
            seen.push(object.sop_class_uid.clone());
            proposed.push(ProposedContext {
                id,
                abstract_syntax: AbstractSyntax::Storage(object.sop_class_uid.clone()),
                transfer_syntaxes: vec![
                    EXPLICIT_VR_LE.uid().to_owned(),
                    IMPLICIT_VR_LE.uid().to_owned(),
                ],
            });
            id = id.wrapping_add(2);
        }
        AssociationOffer {
            called: destination.clone(),
            calling: self.aet.clone(),
            proposed,
        }
    }

    async fn push_objects(
        &self,
        destination: &AeTitle,
        objects: Vec<StoredObject>,
    ) -> Result<MoveReport> {
        let connector = self.destinations.get(destination.as_str()).ok_or_else(|| {
            DimseError::MoveRefused(format!("unknown move destination '{destination}'"))
        })?;
        let offer = self.storage_offer(destination, &objects);
        let mut association = connector.connect(offer).await.map_err(|e| {
            DimseError::MoveRefused(format!("destination association failed: {e}"))
        })?;

        let mut report = MoveReport::default();
        for object in objects {
            let sop = object.sop_instance.clone();
            match association.store(object).await {
                Ok(status) if status.is_success() => report.completed += 1,
                Ok(status) => {
                    debug!(sop_instance = %sop, %status, "store sub-operation failed");
                    report.failed += 1;
                }
                Err(e) => {
                    debug!(sop_instance = %sop, error = %e, "store sub-operation lost");
                    report.failed += 1;
                }
            }
        }
        association.release().await?;
        Ok(report)
    }
}

#[async_trait]
impl ArchiveSession for LoopbackArchive {
    async fn echo(&self) -> Result<()> {
        Ok(())
    }

    async fn study_query(
        &self,
        query: StudyQuery,
    ) -> Result<BoxStream<'static, Result<RemoteStudySummary>>> {
        if let Some(message) = &self.fixture.fail_study_query {
            let failure = DimseError::QueryFailed(message.clone());
            return Ok(stream::iter(vec![Err(failure)]).boxed());
        }
        let matches: Vec<Result<RemoteStudySummary>> = self
            .fixture
            .studies
            .iter()
            .filter(|study| match (&query.patient, &study.patient_id) {
                (Some(wanted), Some(actual)) => wanted == actual,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|study| {
                study
                    .study_at
                    .map(|at| query.window.contains(at))
                    .unwrap_or(true)
            })
            .map(|study| {
                Ok(RemoteStudySummary {
                    study: study.study_uid.clone(),
                    instance_count: study.reported_instances,
                })
            })
            .collect();
        Ok(stream::iter(matches).boxed())
    }

    async fn series_query(
        &self,
        study: &StudyUid,
    ) -> Result<BoxStream<'static, Result<RemoteSeriesSummary>>> {
        let Some(fixture) = self.study(study) else {
            return Ok(stream::iter(Vec::new()).boxed());
        };
        if fixture.fail_series_query {
            let failure = DimseError::QueryFailed(format!("series query refused for {study}"));
            return Ok(stream::iter(vec![Err(failure)]).boxed());
        }
        let matches: Vec<Result<RemoteSeriesSummary>> = fixture
            .series
            .iter()
            .map(|series| {
                Ok(RemoteSeriesSummary {
                    series: series.series_uid.clone(),
                    instance_count: series.reported_instances,
                })
            })
            .collect();
        Ok(stream::iter(matches).boxed())
    }

    async fn move_study(
        &self,
        study: &StudyUid,
        destination: &AeTitle,
        _priority: Priority,
    ) -> Result<MoveReport> {
        let fixture = self
            .study(study)
            .ok_or_else(|| DimseError::MoveRefused(format!("no such study {study}")))?;
        if fixture.refuse_moves {
            return Err(DimseError::MoveRefused(format!(
                "archive refused retrieval of {study}"
            )));
        }
        let objects: Vec<StoredObject> = fixture
            .objects()
            .map(|o| StoredObject {
                sop_class_uid: o.sop_class_uid.clone(),
                sop_instance: o.sop_instance_uid.clone(),
                payload: o.payload.clone(),
            })
            .collect();
        self.push_objects(destination, objects).await
    }

    async fn move_series(
        &self,
        study: &StudyUid,
        series: &SeriesUid,
        destination: &AeTitle,
        _priority: Priority,
    ) -> Result<MoveReport> {
        let fixture = self
            .study(study)
            .ok_or_else(|| DimseError::MoveRefused(format!("no such study {study}")))?;
        if fixture.refuse_moves {
            return Err(DimseError::MoveRefused(format!(
                "archive refused retrieval of {study}"
            )));
        }
        let series_fixture = fixture
            .series
            .iter()
            .find(|s| &s.series_uid == series)
            .ok_or_else(|| {
                DimseError::MoveRefused(format!("no such series {series} in study {study}"))
            })?;
        let objects: Vec<StoredObject> = series_fixture
            .objects
            .iter()
            .map(|o| StoredObject {
                sop_class_uid: o.sop_class_uid.clone(),
                sop_instance: o.sop_instance_uid.clone(),
                payload: o.payload.clone(),
            })
            .collect();
        self.push_objects(destination, objects).await
    }
}
