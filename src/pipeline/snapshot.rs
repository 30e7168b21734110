//! JSON snapshots of fetched data for offline rebuilds.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::fetch::FetchedData;
use crate::analysis::{Milestone, Observation, PlanSummary, RunMetadata, TimelineStore};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub captured_at: DateTime<Utc>,
    pub run_ids: Vec<u64>,
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub runs: BTreeMap<u64, RunMetadata>,
    #[serde(default)]
    pub plans: Vec<PlanSummary>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl Snapshot {
    pub fn capture(data: &FetchedData, captured_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            captured_at,
            run_ids: data.run_ids.iter().copied().collect(),
            observations: data.store.observations(),
            runs: data.metadata.clone(),
            plans: data.plans.clone(),
            milestones: data.milestones.clone(),
        }
    }

    pub fn into_fetched(self) -> FetchedData {
        FetchedData {
            run_ids: self.run_ids.into_iter().collect(),
            store: TimelineStore::from_observations(self.observations),
            metadata: self.runs,
            plans: self.plans,
            milestones: self.milestones,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot: {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot: {}", path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            bail!(
                "unsupported snapshot version {} in {} (expected {})",
                snapshot.version,
                path.display(),
                SNAPSHOT_VERSION
            );
        }
        info!(
            path = %path.display(),
            runs = snapshot.run_ids.len(),
            observations = snapshot.observations.len(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("failed to write snapshot: {}", path.display()))?;
        info!(path = %path.display(), "saved snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StatusId;
    use std::collections::BTreeSet;

    #[test]
    fn test_save_and_load() {
        let data = FetchedData {
            run_ids: BTreeSet::from([10, 11]),
            store: TimelineStore::from_observations([Observation {
                run_id: 10,
                test_id: 4,
                timestamp: 1_700_000_000,
                status: StatusId::FAILED,
            }]),
            metadata: BTreeMap::from([(11, RunMetadata::unavailable())]),
            plans: Vec::new(),
            milestones: Vec::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snap.json");
        Snapshot::capture(&data, Utc::now()).save(&path).unwrap();

        let restored = Snapshot::load(&path).unwrap().into_fetched();
        assert_eq!(restored.run_ids, data.run_ids);
        assert_eq!(restored.store.observations(), data.store.observations());
        assert_eq!(restored.metadata, data.metadata);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(
            &path,
            r#"{"version":99,"captured_at":"2024-01-01T00:00:00Z","run_ids":[],"observations":[]}"#,
        )
        .unwrap();
        assert!(Snapshot::load(&path).is_err());
    }
}
