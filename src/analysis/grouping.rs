//! Plan grouping of run summary rows.

use super::summary::{GrandTotals, RunSummaryRow, UNPLANNED};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A test plan and the runs it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: u64,
    pub name: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    pub created_on: Option<i64>,
    /// Sorted, de-duplicated.
    #[serde(default)]
    pub run_ids: Vec<u64>,
}

/// Known plans: display names and which plan each run belongs to.
#[derive(Debug, Clone, Default)]
pub struct PlanIndex {
    names: BTreeMap<u64, String>,
    run_owner: BTreeMap<u64, u64>,
    plan_runs: BTreeMap<u64, BTreeSet<u64>>,
}

impl PlanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed display names (e.g. from configuration).
    pub fn with_names(names: BTreeMap<u64, String>) -> Self {
        Self {
            names,
            ..Self::default()
        }
    }

    /// Configured names first, then every fetched plan.
    pub fn from_plans(names: BTreeMap<u64, String>, plans: &[PlanSummary]) -> Self {
        let mut index = Self::with_names(names);
        for plan in plans {
            index.add_plan(plan.id, plan.name.as_deref(), &plan.run_ids);
        }
        index
    }

    /// Register a fetched plan. A configured name takes precedence over
    /// the server name.
    pub fn add_plan(&mut self, plan_id: u64, name: Option<&str>, run_ids: &[u64]) {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            self.names.entry(plan_id).or_insert_with(|| name.to_string());
        }
        let runs = self.plan_runs.entry(plan_id).or_default();
        for &run_id in run_ids {
            runs.insert(run_id);
            self.run_owner.entry(run_id).or_insert(plan_id);
        }
    }

    /// Runs registered for `plan_id`; empty for unknown plans.
    pub fn runs_of(&self, plan_id: u64) -> BTreeSet<u64> {
        self.plan_runs.get(&plan_id).cloned().unwrap_or_default()
    }

    /// Every run belonging to any registered plan.
    pub fn all_runs(&self) -> BTreeSet<u64> {
        self.run_owner.keys().copied().collect()
    }

    pub fn name(&self, plan_id: u64) -> Option<&str> {
        self.names.get(&plan_id).map(String::as_str)
    }

    pub fn owner_of(&self, run_id: u64) -> Option<u64> {
        self.run_owner.get(&run_id).copied()
    }

    pub fn display_name(&self, plan_id: u64) -> String {
        self.name(plan_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Plan {}", plan_id))
    }

    /// Final (key, plan id) for a row.
    fn resolve(&self, row: &RunSummaryRow) -> (String, Option<u64>) {
        if row.plan_key == UNPLANNED {
            return match self.owner_of(row.run_id) {
                Some(plan_id) => (self.display_name(plan_id), Some(plan_id)),
                None => (UNPLANNED.to_string(), None),
            };
        }
        match row.plan_id {
            Some(plan_id) if row.plan_key == plan_id.to_string() => {
                let key = self.name(plan_id).map(str::to_string).unwrap_or_else(|| row.plan_key.clone());
                (key, Some(plan_id))
            }
            plan_id => (row.plan_key.clone(), plan_id),
        }
    }

    /// Copy of `row` carrying its final plan key and plan id. Resolving an
    /// already resolved row changes nothing.
    pub fn resolve_row(&self, row: &RunSummaryRow) -> RunSummaryRow {
        let (plan_key, plan_id) = self.resolve(row);
        RunSummaryRow {
            plan_key,
            plan_id: plan_id.or(row.plan_id),
            ..row.clone()
        }
    }
}

/// Share of planned/executed, one decimal, 0.0 on an empty denominator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentages {
    pub executed: f64,
    pub not_executed: f64,
    pub passed: f64,
    pub failed: f64,
}

impl Percentages {
    pub fn of(totals: &GrandTotals) -> Self {
        Self {
            executed: percent(totals.executed, totals.planned),
            not_executed: percent(totals.not_executed, totals.planned),
            passed: percent(totals.passed, totals.executed),
            failed: percent(totals.failed, totals.executed),
        }
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanGroup {
    pub plan_key: String,
    pub plan_id: Option<u64>,
    pub rows: Vec<RunSummaryRow>,
    pub totals: GrandTotals,
    pub percentages: Percentages,
}

/// Group rows by plan. Groups are ordered by key with `Unplanned` last;
/// rows keep their run-id order inside a group.
pub fn group_by_plan(rows: &[RunSummaryRow], index: &PlanIndex) -> Vec<PlanGroup> {
    let mut buckets: BTreeMap<String, (Option<u64>, Vec<RunSummaryRow>)> = BTreeMap::new();
    for row in rows {
        let (key, plan_id) = index.resolve(row);
        let entry = buckets.entry(key).or_insert((plan_id, Vec::new()));
        if entry.0.is_none() {
            entry.0 = plan_id;
        }
        entry.1.push(index.resolve_row(row));
    }

    let unplanned = buckets.remove(UNPLANNED);
    buckets
        .into_iter()
        .chain(unplanned.map(|b| (UNPLANNED.to_string(), b)))
        .map(|(plan_key, (plan_id, rows))| {
            let totals = GrandTotals::from_rows(&rows);
            PlanGroup {
                plan_key,
                plan_id,
                percentages: Percentages::of(&totals),
                rows,
                totals,
            }
        })
        .collect()
}
