use crate::ids::{SeriesUid, SopInstanceUid, StudyUid};
use std::collections::HashMap;

/// Identifier triple extracted from one local object during the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInventoryEntry {
    pub study: StudyUid,
    pub series: SeriesUid,
    pub instance: SopInstanceUid,
}

/// Immutable per-study and per-series instance counts for the local store.
///
/// Produced once by the scanner after its concurrent aggregation completes;
/// the reconciliation engine and the gap-fill planner only ever read it.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    studies: HashMap<StudyUid, u32>,
    series: HashMap<SeriesUid, u32>,
}

impl InventorySnapshot {
    pub fn new(studies: HashMap<StudyUid, u32>, series: HashMap<SeriesUid, u32>) -> Self {
        Self { studies, series }
    }

    /// Number of locally held instances for a study, `None` when the study
    /// is entirely absent.
    pub fn study_count(&self, study: &StudyUid) -> Option<u32> {
        self.studies.get(study).copied()
    }

    /// Number of locally held instances for a series, `None` when the
    /// series is entirely absent.
    pub fn series_count(&self, series: &SeriesUid) -> Option<u32> {
        self.series.get(series).copied()
    }

    pub fn study_total(&self) -> usize {
        self.studies.len()
    }

    pub fn series_total(&self) -> usize {
        self.series.len()
    }

    pub fn instance_total(&self) -> u32 {
        self.studies.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.studies.is_empty()
    }

    pub fn studies(&self) -> impl Iterator<Item = (&StudyUid, u32)> {
        self.studies.iter().map(|(uid, count)| (uid, *count))
    }

    pub fn series(&self) -> impl Iterator<Item = (&SeriesUid, u32)> {
        self.series.iter().map(|(uid, count)| (uid, *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_distinguish_absent_from_zero() {
        let mut studies = HashMap::new();
        studies.insert(StudyUid::new("1.2.3").unwrap(), 4);
        let snapshot = InventorySnapshot::new(studies, HashMap::new());

        assert_eq!(snapshot.study_count(&StudyUid::new("1.2.3").unwrap()), Some(4));
        assert_eq!(snapshot.study_count(&StudyUid::new("9.9").unwrap()), None);
        assert_eq!(snapshot.instance_total(), 4);
    }
}
