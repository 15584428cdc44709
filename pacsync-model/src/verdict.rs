use crate::ids::{SeriesUid, SopInstanceUid, StudyUid};
use std::fmt;
use std::path::PathBuf;

/// Classification outcome for one remote study summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudyStatus {
    /// Nothing held locally (or the remote omitted its count and we prefer
    /// a refetch over a silent gap).
    Missing,
    /// Some instances held locally, fewer than the remote claims.
    Partial,
    /// Local and remote instance counts agree.
    Complete,
    /// More instances held locally than the remote claims. Reported, never
    /// auto-corrected.
    Anomalous,
}

impl fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StudyStatus::Missing => "missing",
            StudyStatus::Partial => "partial",
            StudyStatus::Complete => "complete",
            StudyStatus::Anomalous => "anomalous",
        };
        write!(f, "{label}")
    }
}

/// One study's reconciliation verdict. Immutable once created; exactly one
/// is produced per remote summary consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationVerdict {
    pub study: StudyUid,
    pub status: StudyStatus,
    pub local: u32,
    pub remote: Option<u32>,
}

/// A series the local store holds fewer instances of than the remote
/// archive claims. Produced only for `Partial` studies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesGap {
    pub study: StudyUid,
    pub series: SeriesUid,
    pub local: u32,
    pub remote: Option<u32>,
}

/// Aggregate retrieval work for one pass: whole studies to fetch plus
/// series-level gaps. Dispatch order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    studies: Vec<StudyUid>,
    series: Vec<SeriesGap>,
}

impl FetchPlan {
    pub fn push_study(&mut self, study: StudyUid) {
        self.studies.push(study);
    }

    pub fn push_series_gap(&mut self, gap: SeriesGap) {
        self.series.push(gap);
    }

    pub fn studies(&self) -> &[StudyUid] {
        &self.studies
    }

    pub fn series_gaps(&self) -> &[SeriesGap] {
        &self.series
    }

    pub fn is_empty(&self) -> bool {
        self.studies.is_empty() && self.series.is_empty()
    }

    pub fn command_total(&self) -> usize {
        self.studies.len() + self.series.len()
    }
}

/// Record of one inbound object accepted and persisted by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedObjectRecord {
    pub sop_instance: SopInstanceUid,
    pub path: PathBuf,
}
