//! Streaming reconciliation engine.
//!
//! Classification is a pure function of one remote summary and the frozen
//! local snapshot, so remote records can be classified as they arrive and
//! arrival order can never change a verdict.

pub mod planner;

use pacsync_dimse::RemoteStudySummary;
use pacsync_model::{InventorySnapshot, ReconciliationVerdict, StudyStatus};
use tracing::warn;

/// Classify one remote study summary against the local snapshot.
///
/// A remote summary without an instance count is classified `Missing`: some
/// vendors omit the field, and a refetch is preferred over a silent gap.
/// `Anomalous` (more held locally than the remote claims) is reported and
/// carried in the verdict but never acted on.
pub fn classify(snapshot: &InventorySnapshot, summary: &RemoteStudySummary) -> ReconciliationVerdict {
    let local = snapshot.study_count(&summary.study);
    let status = match (local, summary.instance_count) {
        (None, _) => StudyStatus::Missing,
        (Some(_), None) => StudyStatus::Missing,
        (Some(l), Some(r)) if l < r => StudyStatus::Partial,
        (Some(l), Some(r)) if l > r => StudyStatus::Anomalous,
        (Some(_), Some(_)) => StudyStatus::Complete,
    };
    if status == StudyStatus::Anomalous {
        warn!(
            study = %summary.study,
            local = local.unwrap_or(0),
            remote = summary.instance_count.unwrap_or(0),
            "disappearing instances detected"
        );
    }
    ReconciliationVerdict {
        study: summary.study.clone(),
        status,
        local: local.unwrap_or(0),
        remote: summary.instance_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacsync_model::StudyUid;
    use std::collections::HashMap;

    fn snapshot(counts: &[(&str, u32)]) -> InventorySnapshot {
        let studies: HashMap<StudyUid, u32> = counts
            .iter()
            .map(|(uid, count)| (StudyUid::new(uid).unwrap(), *count))
            .collect();
        InventorySnapshot::new(studies, HashMap::new())
    }

    fn summary(uid: &str, count: Option<u32>) -> RemoteStudySummary {
        RemoteStudySummary {
            study: StudyUid::new(uid).unwrap(),
            instance_count: count,
        }
    }

    #[test]
    fn classification_is_exhaustive_and_mutually_exclusive() {
        let snap = snapshot(&[("1.1", 1), ("1.3", 3), ("1.5", 5)]);
        for local in [None, Some(1u32), Some(3), Some(5)] {
            for remote in [None, Some(1u32), Some(3), Some(5)] {
                let uid = match local {
                    None => "9.9".to_owned(),
                    Some(n) => format!("1.{n}"),
                };
                let verdict = classify(&snap, &summary(&uid, remote));
                let expected = match (local, remote) {
                    (None, _) | (Some(_), None) => StudyStatus::Missing,
                    (Some(l), Some(r)) if l < r => StudyStatus::Partial,
                    (Some(l), Some(r)) if l > r => StudyStatus::Anomalous,
                    _ => StudyStatus::Complete,
                };
                assert_eq!(verdict.status, expected, "local {local:?} remote {remote:?}");
                assert_eq!(verdict.local, local.unwrap_or(0));
                assert_eq!(verdict.remote, remote);
            }
        }
    }

    #[test]
    fn arrival_order_does_not_change_the_verdict_set() {
        use rand::seq::SliceRandom;

        let snap = snapshot(&[("1.1", 3), ("1.2", 2), ("1.3", 7)]);
        let summaries = vec![
            summary("1.1", Some(3)),
            summary("1.2", Some(5)),
            summary("1.3", Some(4)),
            summary("2.1", Some(1)),
            summary("1.1", None),
        ];

        let mut baseline: Vec<_> = summaries.iter().map(|s| classify(&snap, s)).collect();
        baseline.sort_by(|a, b| (&a.study, a.status as u8).cmp(&(&b.study, b.status as u8)));

        let mut rng = rand::rng();
        for _ in 0..8 {
            let mut shuffled = summaries.clone();
            shuffled.shuffle(&mut rng);
            let mut verdicts: Vec<_> = shuffled.iter().map(|s| classify(&snap, s)).collect();
            verdicts.sort_by(|a, b| (&a.study, a.status as u8).cmp(&(&b.study, b.status as u8)));
            assert_eq!(verdicts, baseline);
        }
    }

    #[test]
    fn every_summary_yields_exactly_one_verdict() {
        let snap = snapshot(&[("1.1", 3)]);
        // The same study can legitimately appear more than once in a query
        // response; each appearance is judged on its own.
        let summaries = [
            summary("1.1", Some(3)),
            summary("1.1", Some(5)),
            summary("1.1", Some(2)),
        ];
        let verdicts: Vec<_> = summaries.iter().map(|s| classify(&snap, s)).collect();
        assert_eq!(verdicts.len(), 3);
        assert_eq!(verdicts[0].status, StudyStatus::Complete);
        assert_eq!(verdicts[1].status, StudyStatus::Partial);
        assert_eq!(verdicts[2].status, StudyStatus::Anomalous);
    }
}
