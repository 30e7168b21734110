//! Per-run planned/executed/passed/failed summaries and grand totals.

use super::timeline::{StatusId, TimelineStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const UNPLANNED: &str = "Unplanned";

/// Server-side status counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounters {
    pub passed: u64,
    pub blocked: u64,
    pub untested: u64,
    pub retest: u64,
    pub failed: u64,
}

impl StatusCounters {
    pub fn planned(&self) -> u64 {
        self.passed + self.blocked + self.untested + self.retest + self.failed
    }

    pub fn executed(&self) -> u64 {
        self.passed + self.failed
    }

    /// Retests are planned but neither executed nor "not executed".
    pub fn not_executed(&self) -> u64 {
        self.blocked + self.untested
    }
}

/// Whether a run's authoritative counters could be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "counters", rename_all = "snake_case")]
pub enum Counters {
    Available(StatusCounters),
    Unavailable,
}

/// Descriptive run fields used for labels and plan grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub name: Option<String>,
    pub config: Option<String>,
    pub plan_id: Option<u64>,
    pub plan_name: Option<String>,
}

/// Run metadata as fetched from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub descriptor: RunDescriptor,
    pub counters: Counters,
}

impl RunMetadata {
    pub fn unavailable() -> Self {
        Self {
            descriptor: RunDescriptor::default(),
            counters: Counters::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    /// Counters taken verbatim from run metadata.
    Metadata,
    /// Tallied from the latest observed status per test.
    Observed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummaryRow {
    pub run_id: u64,
    pub run_label: String,
    pub run_name: String,
    pub configuration: Option<String>,
    pub plan_id: Option<u64>,
    pub plan_key: String,
    pub planned: u64,
    pub executed: u64,
    pub not_executed: u64,
    pub passed: u64,
    pub failed: u64,
    pub source: CountSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GrandTotals {
    pub planned: u64,
    pub executed: u64,
    pub not_executed: u64,
    pub passed: u64,
    pub failed: u64,
}

impl GrandTotals {
    pub fn add(&mut self, row: &RunSummaryRow) {
        self.planned += row.planned;
        self.executed += row.executed;
        self.not_executed += row.not_executed;
        self.passed += row.passed;
        self.failed += row.failed;
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a RunSummaryRow>) -> Self {
        let mut totals = Self::default();
        for row in rows {
            totals.add(row);
        }
        totals
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub rows: Vec<RunSummaryRow>,
    pub grand: GrandTotals,
}

/// Split a trailing parenthesised configuration off a run name:
/// `"Checkout (Chrome, EU)"` becomes `("Checkout", Some("Chrome, EU"))`.
///
/// Only a final `(...)` group is considered, so names that legitimately
/// end in parentheses (`"Migrate (v2)"`) are split too. Names without a
/// trailing group come back unchanged.
pub fn split_configuration_suffix(name: &str) -> (String, Option<String>) {
    let trimmed = name.trim();
    if let Some(body) = trimmed.strip_suffix(')') {
        if let Some(open) = body.rfind('(') {
            let base = body[..open].trim();
            let config = body[open + 1..].trim();
            if !base.is_empty() && !config.is_empty() {
                return (base.to_string(), Some(config.to_string()));
            }
        }
    }
    (trimmed.to_string(), None)
}

/// Resolve display name and configuration. An explicit `config` field
/// wins over the name suffix.
fn label_parts(run_id: u64, descriptor: &RunDescriptor) -> (String, Option<String>) {
    let explicit = descriptor
        .config
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let Some(name) = descriptor.name.as_deref().filter(|n| !n.trim().is_empty()) else {
        return (format!("Run {}", run_id), explicit.map(str::to_string));
    };

    let (base, suffix) = split_configuration_suffix(name);
    match (explicit, suffix) {
        (Some(cfg), Some(sfx)) if sfx == cfg => (base, Some(sfx)),
        (Some(cfg), _) => (name.trim().to_string(), Some(cfg.to_string())),
        (None, sfx) => (base, sfx),
    }
}

fn plan_key(descriptor: &RunDescriptor) -> String {
    if let Some(name) = descriptor.plan_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.trim().to_string();
    }
    match descriptor.plan_id {
        Some(id) => id.to_string(),
        None => UNPLANNED.to_string(),
    }
}

/// Tally (planned, passed, failed) from the latest status of each test.
fn observed_counts(store: &TimelineStore, run_id: u64) -> (u64, u64, u64) {
    let mut planned = 0;
    let mut passed = 0;
    let mut failed = 0;
    for (_, timeline) in store.run_timelines(run_id) {
        planned += 1;
        match timeline.latest().map(|s| s.status) {
            Some(StatusId::PASSED) => passed += 1,
            Some(StatusId::FAILED) => failed += 1,
            _ => {}
        }
    }
    (planned, passed, failed)
}

/// Build one row per run found in `store` or listed in `expected_run_ids`.
///
/// Runs with available counters use them verbatim; everything else falls
/// back to the observed tallies. Missing metadata entries are treated as
/// unavailable.
pub fn build_run_summaries(
    store: &TimelineStore,
    metadata: &BTreeMap<u64, RunMetadata>,
    expected_run_ids: &BTreeSet<u64>,
) -> RunSummary {
    let run_ids: BTreeSet<u64> = store.run_ids().union(expected_run_ids).copied().collect();
    let unavailable = RunMetadata::unavailable();

    let mut rows = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
        let meta = metadata.get(&run_id).unwrap_or(&unavailable);
        let (run_name, configuration) = label_parts(run_id, &meta.descriptor);
        let run_label = match &configuration {
            Some(cfg) => format!("{} [{}]", run_name, cfg),
            None => run_name.clone(),
        };

        let (planned, executed, not_executed, passed, failed, source) = match meta.counters {
            Counters::Available(c) => (
                c.planned(),
                c.executed(),
                c.not_executed(),
                c.passed,
                c.failed,
                CountSource::Metadata,
            ),
            Counters::Unavailable => {
                let (planned, passed, failed) = observed_counts(store, run_id);
                let executed = passed + failed;
                (
                    planned,
                    executed,
                    planned.saturating_sub(executed),
                    passed,
                    failed,
                    CountSource::Observed,
                )
            }
        };

        rows.push(RunSummaryRow {
            run_id,
            run_label,
            run_name,
            configuration,
            plan_id: meta.descriptor.plan_id,
            plan_key: plan_key(&meta.descriptor),
            planned,
            executed,
            not_executed,
            passed,
            failed,
            source,
        });
    }

    let grand = GrandTotals::from_rows(&rows);
    RunSummary { rows, grand }
}
