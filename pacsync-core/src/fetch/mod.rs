//! Retrieval dispatcher.
//!
//! Turns the fetch plan into retrieval commands on the single outbound
//! session, in plan order: study-root moves for whole-missing studies,
//! series-scoped moves for gaps. Dispatch is best-effort fan-out; a peer
//! refusing one command never costs the rest of the plan.

use crate::error::{CoreError, Result};
use pacsync_dimse::{ArchiveSession, Priority};
use pacsync_model::{AeTitle, FetchPlan};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tally of one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Commands the peer accepted.
    pub dispatched: usize,
    /// Commands the peer refused or that failed at the session level.
    pub refused: usize,
    /// Sub-operations the peer reported completed across all commands.
    pub sub_completed: u32,
    /// Sub-operations the peer reported failed across all commands.
    pub sub_failed: u32,
}

/// Issues the plan's retrieval commands with this system's listener as the
/// destination, tagged background priority.
pub struct RetrievalDispatcher<'a> {
    session: &'a dyn ArchiveSession,
    destination: AeTitle,
}

impl std::fmt::Debug for RetrievalDispatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalDispatcher")
            .field("destination", &self.destination)
            .finish()
    }
}

impl<'a> RetrievalDispatcher<'a> {
    pub fn new(session: &'a dyn ArchiveSession, destination: AeTitle) -> Self {
        Self {
            session,
            destination,
        }
    }

    pub async fn dispatch(
        &self,
        plan: &FetchPlan,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        if plan.is_empty() {
            debug!("fetch plan is empty, nothing to dispatch");
            return Ok(report);
        }
        info!(
            studies = plan.studies().len(),
            series_gaps = plan.series_gaps().len(),
            destination = %self.destination,
            "dispatching retrieval plan"
        );

        for study in plan.studies() {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled("retrieval dispatch interrupted".into()));
            }
            match self
                .session
                .move_study(study, &self.destination, Priority::Low)
                .await
            {
                Ok(moved) => {
                    report.dispatched += 1;
                    report.sub_completed += moved.completed;
                    report.sub_failed += moved.failed;
                    if moved.failed > 0 {
                        warn!(%study, failed = moved.failed, "retrieval completed with failed sub-operations");
                    } else {
                        debug!(%study, completed = moved.completed, "study retrieval dispatched");
                    }
                }
                Err(e) => {
                    warn!(%study, error = %e, "study retrieval command refused");
                    report.refused += 1;
                }
            }
        }

        for gap in plan.series_gaps() {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled("retrieval dispatch interrupted".into()));
            }
            match self
                .session
                .move_series(&gap.study, &gap.series, &self.destination, Priority::Low)
                .await
            {
                Ok(moved) => {
                    report.dispatched += 1;
                    report.sub_completed += moved.completed;
                    report.sub_failed += moved.failed;
                    if moved.failed > 0 {
                        warn!(
                            study = %gap.study,
                            series = %gap.series,
                            failed = moved.failed,
                            "series retrieval completed with failed sub-operations"
                        );
                    } else {
                        debug!(
                            study = %gap.study,
                            series = %gap.series,
                            completed = moved.completed,
                            "series retrieval dispatched"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        study = %gap.study,
                        series = %gap.series,
                        error = %e,
                        "series retrieval command refused"
                    );
                    report.refused += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacsync_dimse::loopback::{
        ArchiveFixture, LoopbackArchive, ObjectFixture, SeriesFixture, StudyFixture,
        association_channel,
    };
    use pacsync_dimse::{
        AssociationAcceptor, ContextResult, DimseStatus, InboundCommand, NegotiatedContext,
    };
    use pacsync_model::{SeriesGap, SeriesUid, SopInstanceUid, StudyUid};

    fn study(uid: &str) -> StudyUid {
        StudyUid::new(uid).unwrap()
    }

    #[tokio::test]
    async fn refused_commands_do_not_abort_the_rest_of_the_plan() {
        let (connector, acceptor) = association_channel(8);

        let sink = tokio::spawn(async move {
            let mut stored = Vec::new();
            while let Some(mut association) = acceptor.accept().await.unwrap() {
                let contexts: Vec<NegotiatedContext> = association
                    .offer()
                    .proposed
                    .iter()
                    .map(|pc| NegotiatedContext {
                        id: pc.id,
                        result: ContextResult::Accepted(pc.transfer_syntaxes[0].clone()),
                    })
                    .collect();
                association.accept(contexts).await.unwrap();
                loop {
                    match association.next_command().await.unwrap() {
                        Some(InboundCommand::Store { message_id, object }) => {
                            stored.push(object.sop_instance.clone());
                            association
                                .respond_store(message_id, DimseStatus::Success)
                                .await
                                .unwrap();
                        }
                        Some(InboundCommand::Echo { message_id }) => {
                            association
                                .respond_echo(message_id, DimseStatus::Success)
                                .await
                                .unwrap();
                        }
                        Some(InboundCommand::Release) => {
                            association.confirm_release().await.unwrap();
                            break;
                        }
                        Some(InboundCommand::Abort { .. }) | None => break,
                    }
                }
            }
            stored
        });

        let mut refused = StudyFixture::new(study("9.9"));
        refused.refuse_moves = true;
        let mut held = StudyFixture::new(study("1.1"));
        let mut series = SeriesFixture::new(SeriesUid::new("1.1.1").unwrap());
        series.objects = vec![
            ObjectFixture::inline(SopInstanceUid::new("1.1.1.1").unwrap(), b"a".to_vec()),
            ObjectFixture::inline(SopInstanceUid::new("1.1.1.2").unwrap(), b"b".to_vec()),
        ];
        held.series = vec![series];
        let mut fixture = ArchiveFixture::new("ARCHIVE");
        fixture.studies = vec![refused, held];

        let mut archive = LoopbackArchive::new(fixture).unwrap();
        archive.add_destination(AeTitle::new("PACSYNC").unwrap(), connector);

        let mut plan = FetchPlan::default();
        plan.push_study(study("9.9"));
        plan.push_study(study("1.1"));
        plan.push_series_gap(SeriesGap {
            study: study("1.1"),
            series: SeriesUid::new("1.1.1").unwrap(),
            local: 0,
            remote: Some(2),
        });

        let dispatcher =
            RetrievalDispatcher::new(&archive, AeTitle::new("PACSYNC").unwrap());
        let report = dispatcher
            .dispatch(&plan, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.refused, 1);
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.sub_completed, 4);
        assert_eq!(report.sub_failed, 0);

        drop(dispatcher);
        drop(archive);
        let stored = sink.await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn cancellation_interrupts_dispatch() {
        let fixture = {
            let mut f = ArchiveFixture::new("ARCHIVE");
            f.studies = vec![StudyFixture::new(study("1.1"))];
            f
        };
        let archive = LoopbackArchive::new(fixture).unwrap();
        let mut plan = FetchPlan::default();
        plan.push_study(study("1.1"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = RetrievalDispatcher::new(&archive, AeTitle::new("PACSYNC").unwrap())
            .dispatch(&plan, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled(_)));
    }
}
