//! Per-(run, test) observation timelines.
//!
//! The store is filled by the fetch layer once all fetches of a phase have
//! completed and is read-only for the aggregation code afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// TestRail result status id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub u8);

impl StatusId {
    pub const PASSED: StatusId = StatusId(1);
    pub const BLOCKED: StatusId = StatusId(2);
    pub const UNTESTED: StatusId = StatusId(3);
    pub const RETEST: StatusId = StatusId(4);
    pub const FAILED: StatusId = StatusId(5);
}

impl std::fmt::Display for StatusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            StatusId::PASSED => write!(f, "passed"),
            StatusId::BLOCKED => write!(f, "blocked"),
            StatusId::UNTESTED => write!(f, "untested"),
            StatusId::RETEST => write!(f, "retest"),
            StatusId::FAILED => write!(f, "failed"),
            StatusId(other) => write!(f, "status-{}", other),
        }
    }
}

/// Status codes that count as "the test ran".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatusSet(BTreeSet<StatusId>);

impl ExecutedStatusSet {
    pub fn new(statuses: impl IntoIterator<Item = StatusId>) -> Self {
        Self(statuses.into_iter().collect())
    }

    pub fn contains(&self, status: StatusId) -> bool {
        self.0.contains(&status)
    }

    pub fn iter(&self) -> impl Iterator<Item = StatusId> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ExecutedStatusSet {
    fn default() -> Self {
        Self::new([StatusId::PASSED, StatusId::FAILED])
    }
}

/// One reported result for a (run, test) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub run_id: u64,
    pub test_id: u64,
    /// Seconds since the Unix epoch, UTC.
    pub timestamp: i64,
    pub status: StatusId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimelineKey {
    pub run_id: u64,
    pub test_id: u64,
}

/// A (timestamp, status) point inside one timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSample {
    pub timestamp: i64,
    pub status: StatusId,
}

/// Samples for one (run, test) pair, kept in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    samples: Vec<StatusSample>,
}

impl Timeline {
    pub fn push(&mut self, sample: StatusSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples sorted ascending by timestamp. The sort is stable, so
    /// samples sharing a timestamp keep their arrival order.
    pub fn chronological(&self) -> Vec<StatusSample> {
        let mut ordered = self.samples.clone();
        ordered.sort_by_key(|s| s.timestamp);
        ordered
    }

    /// First sample (in chronological order) whose status is executed.
    pub fn first_executed(&self, executed: &ExecutedStatusSet) -> Option<StatusSample> {
        self.chronological()
            .into_iter()
            .find(|s| executed.contains(s.status))
    }

    /// Most recent sample; on timestamp ties the last one to arrive wins.
    pub fn latest(&self) -> Option<StatusSample> {
        self.chronological().last().copied()
    }
}

/// Timeline store keyed by (run_id, test_id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineStore {
    timelines: BTreeMap<TimelineKey, Timeline>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let mut store = Self::new();
        store.extend(observations);
        store
    }

    pub fn record(&mut self, obs: Observation) {
        let key = TimelineKey {
            run_id: obs.run_id,
            test_id: obs.test_id,
        };
        self.timelines.entry(key).or_default().push(StatusSample {
            timestamp: obs.timestamp,
            status: obs.status,
        });
    }

    pub fn extend(&mut self, observations: impl IntoIterator<Item = Observation>) {
        for obs in observations {
            self.record(obs);
        }
    }

    pub fn get(&self, run_id: u64, test_id: u64) -> Option<&Timeline> {
        self.timelines.get(&TimelineKey { run_id, test_id })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TimelineKey, &Timeline)> {
        self.timelines.iter()
    }

    /// Timelines belonging to a single run, ordered by test id.
    pub fn run_timelines(&self, run_id: u64) -> impl Iterator<Item = (&TimelineKey, &Timeline)> {
        let lo = TimelineKey { run_id, test_id: 0 };
        let hi = TimelineKey {
            run_id,
            test_id: u64::MAX,
        };
        self.timelines.range(lo..=hi)
    }

    pub fn run_ids(&self) -> BTreeSet<u64> {
        self.timelines.keys().map(|k| k.run_id).collect()
    }

    /// Copy of the store restricted to the given runs.
    pub fn restricted_to(&self, run_ids: &BTreeSet<u64>) -> Self {
        Self {
            timelines: self
                .timelines
                .iter()
                .filter(|(k, _)| run_ids.contains(&k.run_id))
                .map(|(k, t)| (*k, t.clone()))
                .collect(),
        }
    }

    /// Flatten back into observations (arrival order within each timeline).
    pub fn observations(&self) -> Vec<Observation> {
        self.timelines
            .iter()
            .flat_map(|(k, t)| {
                t.samples.iter().map(move |s| Observation {
                    run_id: k.run_id,
                    test_id: k.test_id,
                    timestamp: s.timestamp,
                    status: s.status,
                })
            })
            .collect()
    }

    /// Number of (run, test) pairs.
    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(run_id: u64, test_id: u64, timestamp: i64, status: StatusId) -> Observation {
        Observation {
            run_id,
            test_id,
            timestamp,
            status,
        }
    }

    #[test]
    fn test_first_executed_ignores_arrival_order() {
        let store = TimelineStore::from_observations([
            obs(1, 1, 300, StatusId::PASSED),
            obs(1, 1, 100, StatusId::BLOCKED),
            obs(1, 1, 200, StatusId::FAILED),
        ]);
        let first = store
            .get(1, 1)
            .unwrap()
            .first_executed(&ExecutedStatusSet::default())
            .unwrap();
        assert_eq!(first.timestamp, 200);
        assert_eq!(first.status, StatusId::FAILED);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let store = TimelineStore::from_observations([
            obs(1, 1, 100, StatusId::FAILED),
            obs(1, 1, 100, StatusId::PASSED),
        ]);
        let timeline = store.get(1, 1).unwrap();
        let first = timeline.first_executed(&ExecutedStatusSet::default()).unwrap();
        assert_eq!(first.status, StatusId::FAILED);
        assert_eq!(timeline.latest().unwrap().status, StatusId::PASSED);
    }

    #[test]
    fn test_no_executed_sample() {
        let store = TimelineStore::from_observations([
            obs(1, 1, 100, StatusId::BLOCKED),
            obs(1, 1, 200, StatusId::RETEST),
        ]);
        assert!(store
            .get(1, 1)
            .unwrap()
            .first_executed(&ExecutedStatusSet::default())
            .is_none());
    }

    #[test]
    fn test_run_timelines_range() {
        let store = TimelineStore::from_observations([
            obs(1, 5, 1, StatusId::PASSED),
            obs(2, 1, 1, StatusId::PASSED),
            obs(2, 9, 1, StatusId::FAILED),
            obs(3, 1, 1, StatusId::PASSED),
        ]);
        let tests: Vec<u64> = store.run_timelines(2).map(|(k, _)| k.test_id).collect();
        assert_eq!(tests, vec![1, 9]);
        assert_eq!(store.run_ids().into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_restricted_to_and_observations() {
        let store = TimelineStore::from_observations([
            obs(1, 1, 10, StatusId::PASSED),
            obs(2, 1, 20, StatusId::FAILED),
            obs(2, 1, 30, StatusId::PASSED),
        ]);
        let only_two = store.restricted_to(&BTreeSet::from([2]));
        assert_eq!(only_two.len(), 1);
        let flat = only_two.observations();
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|o| o.run_id == 2));
    }
}
