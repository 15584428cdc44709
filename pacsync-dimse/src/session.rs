use crate::error::Result;
use crate::types::{MoveReport, Priority, RemoteSeriesSummary, RemoteStudySummary};
use async_trait::async_trait;
use futures::stream::BoxStream;
use pacsync_model::{AeTitle, SeriesUid, StudyUid, TimeWindow};

/// Study-level directory query scope: an optional single-patient filter and
/// the closed date/time window.
#[derive(Debug, Clone)]
pub struct StudyQuery {
    pub patient: Option<String>,
    pub window: TimeWindow,
}

/// Outbound session to the remote archive.
///
/// One session serializes its own requests; callers must not issue
/// concurrent commands on it. Query streams are lazy, finite and
/// non-restartable: each record is yielded once, and a stream error means
/// the whole query failed (no partial credit, no internal retry).
#[async_trait]
pub trait ArchiveSession: Send + Sync {
    /// Verification request; answers success iff the peer is alive and
    /// willing to talk to us.
    async fn echo(&self) -> Result<()>;

    /// Study-level directory query over the given scope, requesting the
    /// remote-reported related-instance count per study.
    async fn study_query(
        &self,
        query: StudyQuery,
    ) -> Result<BoxStream<'static, Result<RemoteStudySummary>>>;

    /// Series-level directory query scoped to one study, requesting
    /// per-series related-instance counts.
    async fn series_query(
        &self,
        study: &StudyUid,
    ) -> Result<BoxStream<'static, Result<RemoteSeriesSummary>>>;

    /// Whole-study retrieval, pushed to `destination`.
    async fn move_study(
        &self,
        study: &StudyUid,
        destination: &AeTitle,
        priority: Priority,
    ) -> Result<MoveReport>;

    /// Series-scoped retrieval, pushed to `destination`. Used to close gaps
    /// without re-pulling series already held.
    async fn move_series(
        &self,
        study: &StudyUid,
        series: &SeriesUid,
        destination: &AeTitle,
        priority: Priority,
    ) -> Result<MoveReport>;
}
