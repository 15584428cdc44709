//! Single-flight reconciliation pass.
//!
//! Ties the pipeline together in the order the concurrency model requires:
//! the caller starts the receive listener first (retrievals push back to
//! it), the scan freezes the local snapshot, the study query streams
//! through the engine, partial studies are localized to series gaps, and
//! the plan is dispatched on the same outbound session.

use crate::error::{CoreError, Result};
use crate::fetch::{DispatchReport, RetrievalDispatcher};
use crate::reconcile::{classify, planner};
use crate::scan::{InventoryScanner, ScanReport};
use futures::StreamExt;
use pacsync_dimse::{ArchiveSession, StudyQuery};
use pacsync_model::{AeTitle, FetchPlan, StudyStatus, StudyUid};
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// End-of-pass accounting, printed for the operator.
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub complete: usize,
    pub missing: usize,
    pub partial: usize,
    pub anomalous: usize,
    /// Partial studies whose series-level query failed; reported, excluded
    /// from the plan.
    pub indeterminate: usize,
    pub scan: ScanReport,
    pub dispatch: DispatchReport,
}

impl fmt::Display for PassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "verdicts: {} complete, {} missing, {} partial, {} anomalous, {} indeterminate",
            self.complete, self.missing, self.partial, self.anomalous, self.indeterminate
        )?;
        writeln!(
            f,
            "local store: {} files, {} counted, {} skipped, {} duplicate instances",
            self.scan.files_seen,
            self.scan.counted,
            self.scan.skipped.len(),
            self.scan.duplicate_instances.len()
        )?;
        write!(
            f,
            "retrieval: {} commands dispatched, {} refused, {} objects pushed, {} failed",
            self.dispatch.dispatched,
            self.dispatch.refused,
            self.dispatch.sub_completed,
            self.dispatch.sub_failed
        )
    }
}

/// One reconciliation pass over one storage directory. Not re-entrant: the
/// scan counters and the outbound session are built for a single flight.
#[derive(Debug, Clone)]
pub struct ReconciliationPass {
    query: StudyQuery,
    destination: AeTitle,
    storage_dir: PathBuf,
    scanner: InventoryScanner,
}

impl ReconciliationPass {
    pub fn new(query: StudyQuery, destination: AeTitle, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            query,
            destination,
            storage_dir: storage_dir.into(),
            scanner: InventoryScanner::new(),
        }
    }

    pub fn with_scanner(mut self, scanner: InventoryScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Run the pass. The receive listener must already be accepting
    /// associations: the retrieval commands dispatched at the end of the
    /// pass push objects back at it.
    ///
    /// A study-query failure aborts the pass; there is no internal retry.
    pub async fn run(
        &self,
        session: &dyn ArchiveSession,
        cancel: &CancellationToken,
    ) -> Result<PassSummary> {
        let (snapshot, scan_report) = self.scanner.scan(&self.storage_dir, cancel).await?;

        session.echo().await?;
        debug!("verification preflight answered");

        let mut plan = FetchPlan::default();
        let mut partials: Vec<StudyUid> = Vec::new();
        let (mut complete, mut missing, mut partial, mut anomalous) = (0, 0, 0, 0);

        let mut summaries = session.study_query(self.query.clone()).await?;
        loop {
            let summary = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CoreError::Cancelled("study query interrupted".into()));
                }
                next = summaries.next() => match next {
                    Some(record) => record?,
                    None => break,
                },
            };
            let verdict = classify(&snapshot, &summary);
            match verdict.status {
                StudyStatus::Complete => complete += 1,
                StudyStatus::Missing => {
                    missing += 1;
                    plan.push_study(verdict.study);
                }
                StudyStatus::Partial => {
                    partial += 1;
                    if !partials.contains(&verdict.study) {
                        partials.push(verdict.study);
                    }
                }
                StudyStatus::Anomalous => anomalous += 1,
            }
        }

        info!(
            missing,
            partial, "found {missing} full studies to fetch and {partial} partial"
        );

        let mut indeterminate = 0;
        for study in &partials {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled("gap-fill planning interrupted".into()));
            }
            match planner::plan_partial_study(session, &snapshot, study).await {
                Ok(gaps) => {
                    if gaps.is_empty() {
                        debug!(%study, "no actionable series gaps");
                    }
                    for gap in gaps {
                        plan.push_series_gap(gap);
                    }
                }
                Err(e) => {
                    warn!(%study, error = %e, "series query failed, study is indeterminate");
                    indeterminate += 1;
                }
            }
        }

        let dispatch = RetrievalDispatcher::new(session, self.destination.clone())
            .dispatch(&plan, cancel)
            .await?;

        Ok(PassSummary {
            complete,
            missing,
            partial,
            anomalous,
            indeterminate,
            scan: scan_report,
            dispatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ReceiveListener, ReceiveService};
    use pacsync_dimse::DimseError;
    use pacsync_dimse::loopback::{
        ArchiveFixture, LoopbackArchive, ObjectFixture, SeriesFixture, StudyFixture,
        association_channel,
    };
    use pacsync_model::{SeriesUid, SopInstanceUid, TimeWindow};
    use std::sync::Arc;

    fn query() -> StudyQuery {
        StudyQuery {
            patient: None,
            window: TimeWindow::parse("2024010100-2024010200").unwrap(),
        }
    }

    #[tokio::test]
    async fn study_query_failure_aborts_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut fixture = ArchiveFixture::new("ARCHIVE");
        fixture.fail_study_query = Some("no dataset in response".into());
        let archive = LoopbackArchive::new(fixture).unwrap();

        let pass = ReconciliationPass::new(
            query(),
            AeTitle::new("PACSYNC").unwrap(),
            dir.path(),
        );
        let err = pass
            .run(&archive, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Dimse(DimseError::QueryFailed(_))
        ));
    }

    #[tokio::test]
    async fn missing_studies_are_fetched_into_the_local_store() {
        let dir = tempfile::tempdir().unwrap();

        let mut study = StudyFixture::new(StudyUid::new("1.1").unwrap());
        study.reported_instances = Some(1);
        let mut series = SeriesFixture::new(SeriesUid::new("1.1.1").unwrap());
        series.objects = vec![ObjectFixture::inline(
            SopInstanceUid::new("1.1.1.1").unwrap(),
            b"pushed object".to_vec(),
        )];
        study.series = vec![series];
        let mut fixture = ArchiveFixture::new("ARCHIVE");
        fixture.studies = vec![study];

        let (connector, acceptor) = association_channel(8);
        let mut archive = LoopbackArchive::new(fixture).unwrap();
        archive.add_destination(AeTitle::new("PACSYNC").unwrap(), connector);

        // Listener first; the move at the end of the pass pushes to it.
        let service = Arc::new(ReceiveService::new(
            AeTitle::new("PACSYNC").unwrap(),
            AeTitle::new("ARCHIVE").unwrap(),
            dir.path(),
        ));
        let shutdown = CancellationToken::new();
        let listener = ReceiveListener::new(acceptor, service.clone(), shutdown.clone()).spawn();

        let pass = ReconciliationPass::new(
            query(),
            AeTitle::new("PACSYNC").unwrap(),
            dir.path(),
        );
        let summary = pass
            .run(&archive, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.missing, 1);
        assert_eq!(summary.complete, 0);
        assert_eq!(summary.dispatch.dispatched, 1);
        assert_eq!(summary.dispatch.sub_completed, 1);
        assert_eq!(service.received_count().await, 1);
        assert!(dir.path().join("1.1.1.1.dcm").exists());

        shutdown.cancel();
        listener.await.unwrap();
    }
}
