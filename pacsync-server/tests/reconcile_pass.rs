//! End-to-end reconciliation over the loopback provider: local store and
//! listener on one side, fixture archive on the other.

mod support;

use pacsync_core::{InventoryScanner, ReceiveListener, ReceiveService, ReconciliationPass};
use pacsync_dimse::loopback::{
    ArchiveFixture, LoopbackArchive, ObjectFixture, SeriesFixture, StudyFixture,
    association_channel,
};
use pacsync_dimse::StudyQuery;
use pacsync_model::{AeTitle, SeriesUid, SopInstanceUid, StudyUid, TimeWindow};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn ae(s: &str) -> AeTitle {
    AeTitle::new(s).unwrap()
}

fn study_uid(s: &str) -> StudyUid {
    StudyUid::new(s).unwrap()
}

fn series_uid(s: &str) -> SeriesUid {
    SeriesUid::new(s).unwrap()
}

fn sop_uid(s: &str) -> SopInstanceUid {
    SopInstanceUid::new(s).unwrap()
}

fn query() -> StudyQuery {
    StudyQuery {
        patient: None,
        window: TimeWindow::parse("2024010100-2024010200").unwrap(),
    }
}

fn object(study: &str, series: &str, sop: &str) -> ObjectFixture {
    ObjectFixture::inline(sop_uid(sop), support::object_bytes(study, series, sop))
}

#[tokio::test]
async fn full_pass_classifies_and_closes_the_gaps() {
    let dir = tempfile::tempdir().unwrap();

    // Local store: three instances of study 1.1, all in series 1.1.1.
    for sop in ["1.1.1.1", "1.1.1.2", "1.1.1.3"] {
        support::write_object(&dir.path().join(format!("{sop}.dcm")), "1.1", "1.1.1", sop);
    }

    // Remote archive. Study 1.1 shows up three times in the window with
    // three different claimed counts, exercising one verdict per summary;
    // study 2.2 is absent locally.
    let mut known = StudyFixture::new(study_uid("1.1"));
    known.reported_instances = Some(3); // matches local: complete
    let mut held_series = SeriesFixture::new(series_uid("1.1.1"));
    held_series.reported_instances = Some(3);
    let mut gap_series = SeriesFixture::new(series_uid("1.1.2"));
    gap_series.reported_instances = Some(2);
    gap_series.objects = vec![object("1.1", "1.1.2", "1.1.2.1"), object("1.1", "1.1.2", "1.1.2.2")];
    known.series = vec![held_series, gap_series];

    let mut absent = StudyFixture::new(study_uid("2.2"));
    absent.reported_instances = Some(1);
    let mut absent_series = SeriesFixture::new(series_uid("2.2.1"));
    absent_series.reported_instances = Some(1);
    absent_series.objects = vec![object("2.2", "2.2.1", "2.2.1.1")];
    absent.series = vec![absent_series];

    let mut partial_claim = StudyFixture::new(study_uid("1.1"));
    partial_claim.reported_instances = Some(5); // more than held: partial

    let mut anomalous_claim = StudyFixture::new(study_uid("1.1"));
    anomalous_claim.reported_instances = Some(2); // fewer than held: anomalous

    let mut fixture = ArchiveFixture::new("ARCHIVE");
    fixture.studies = vec![known, absent, partial_claim, anomalous_claim];

    let (connector, acceptor) = association_channel(16);
    let mut archive = LoopbackArchive::new(fixture).unwrap();
    archive.add_destination(ae("PACSYNC"), connector);

    // Listener up before anything is dispatched.
    let service = Arc::new(ReceiveService::new(ae("PACSYNC"), ae("ARCHIVE"), dir.path()));
    let shutdown = CancellationToken::new();
    let listener = ReceiveListener::new(acceptor, service.clone(), shutdown.clone()).spawn();

    let pass = ReconciliationPass::new(query(), ae("PACSYNC"), dir.path());
    let summary = pass.run(&archive, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.complete, 1);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.partial, 1);
    assert_eq!(summary.anomalous, 1);
    assert_eq!(summary.indeterminate, 0);
    assert_eq!(summary.scan.files_seen, 3);
    assert_eq!(summary.scan.counted, 3);

    // One study-root move for 2.2, one series move for the 1.1.2 gap; the
    // anomalous claim triggered nothing.
    assert_eq!(summary.dispatch.dispatched, 2);
    assert_eq!(summary.dispatch.refused, 0);
    assert_eq!(summary.dispatch.sub_completed, 3);

    assert_eq!(service.received_count().await, 3);
    for sop in ["2.2.1.1", "1.1.2.1", "1.1.2.2"] {
        assert!(
            dir.path().join(format!("{sop}.dcm")).exists(),
            "{sop} was not persisted"
        );
        assert!(service.record_for(&sop_uid(sop)).await.is_some());
    }

    shutdown.cancel();
    listener.await.unwrap();

    // The received objects are real objects: a fresh scan reads them back
    // and the store is now complete for both studies.
    let (snapshot, report) = InventoryScanner::new()
        .scan(dir.path(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(snapshot.study_count(&study_uid("1.1")), Some(5));
    assert_eq!(snapshot.study_count(&study_uid("2.2")), Some(1));
    assert_eq!(snapshot.series_count(&series_uid("1.1.2")), Some(2));
}

#[tokio::test]
async fn a_failing_series_query_marks_the_study_indeterminate() {
    let dir = tempfile::tempdir().unwrap();
    support::write_object(&dir.path().join("4.4.1.1.dcm"), "4.4", "4.4.1", "4.4.1.1");

    let mut flaky = StudyFixture::new(study_uid("4.4"));
    flaky.reported_instances = Some(3); // held 1 of 3: partial
    flaky.fail_series_query = true;
    let mut fixture = ArchiveFixture::new("ARCHIVE");
    fixture.studies = vec![flaky];

    let archive = LoopbackArchive::new(fixture).unwrap();
    let pass = ReconciliationPass::new(query(), ae("PACSYNC"), dir.path());
    let summary = pass.run(&archive, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.partial, 1);
    assert_eq!(summary.indeterminate, 1);
    assert_eq!(summary.dispatch.dispatched, 0);
    assert_eq!(summary.dispatch.refused, 0);
}
