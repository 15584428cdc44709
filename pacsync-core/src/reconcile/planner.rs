//! Gap-fill planner.
//!
//! A `Partial` verdict tells us a study is incomplete but not where the
//! holes are. The planner localizes them with a series-level query scoped
//! to the study and the same three-way comparison at series granularity,
//! so retrieval can skip series already held.

use crate::error::Result;
use futures::StreamExt;
use pacsync_dimse::ArchiveSession;
use pacsync_model::{InventorySnapshot, SeriesGap, StudyUid};
use tracing::{debug, warn};

/// Resolve one partial study into its missing series.
///
/// Errors are the caller's cue to mark the study indeterminate; unlike the
/// study-level query, a failure here is isolated to this study.
pub async fn plan_partial_study(
    session: &dyn ArchiveSession,
    snapshot: &InventorySnapshot,
    study: &StudyUid,
) -> Result<Vec<SeriesGap>> {
    let mut gaps = Vec::new();
    let mut records = session.series_query(study).await?;
    while let Some(record) = records.next().await {
        let record = record?;
        let local = snapshot.series_count(&record.series);
        match (local, record.instance_count) {
            (Some(l), Some(r)) if l == r => {
                debug!(%study, series = %record.series, "series already complete");
            }
            (Some(l), Some(r)) if l > r => {
                warn!(
                    %study,
                    series = %record.series,
                    local = l,
                    remote = r,
                    "disappearing instances detected at series level"
                );
            }
            (local, remote) => {
                // Absent locally, short of the remote count, or the remote
                // omitted the count: all three come back as a gap to fetch.
                gaps.push(SeriesGap {
                    study: study.clone(),
                    series: record.series,
                    local: local.unwrap_or(0),
                    remote,
                });
            }
        }
    }
    Ok(gaps)
}
