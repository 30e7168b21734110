//! Assembly and validation of the JSON payload handed to renderers.

use super::calendar::{build_day_window, ReportTimezone};
use super::grouping::{group_by_plan, Percentages, PlanGroup, PlanIndex};
use super::milestones::MilestoneRow;
use super::reconcile::reconcile;
use super::series::compute_execution_series;
use super::summary::{build_run_summaries, GrandTotals, RunMetadata, RunSummaryRow};
use super::timeline::{ExecutedStatusSet, TimelineStore};
use super::AnalysisError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Settings shared by every payload of one report invocation.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub report_id: Uuid,
    pub now: DateTime<Utc>,
    pub timezone: ReportTimezone,
    pub days: u32,
    pub executed: ExecutedStatusSet,
}

/// Fetched (or snapshot) data a payload is computed from.
#[derive(Debug, Clone, Copy)]
pub struct ReportData<'a> {
    pub store: &'a TimelineStore,
    pub metadata: &'a BTreeMap<u64, RunMetadata>,
    pub plans: &'a PlanIndex,
    pub milestones: &'a [MilestoneRow],
}

/// Which runs a payload covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The given runs, regardless of plan.
    Global(BTreeSet<u64>),
    /// All runs of one plan.
    Plan(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report_id: Uuid,
    pub generated_for_date: String,
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    pub dates: Vec<String>,
    pub daily_results: Vec<u64>,
    pub cumulative: Vec<u64>,
    #[serde(default)]
    pub before_window: u64,
    pub rows: Vec<RunSummaryRow>,
    #[serde(default)]
    pub groups: Vec<PlanGroup>,
    pub grand: GrandTotals,
    #[serde(default)]
    pub grand_percentages: Percentages,
    pub source_discrepancy: u64,
    #[serde(default)]
    pub milestones: Vec<MilestoneRow>,
}

impl ReportPayload {
    /// Check the series arrays are aligned, dated in order and monotone.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let n = self.dates.len();
        if self.daily_results.len() != n || self.cumulative.len() != n {
            return Err(AnalysisError::InvalidPayload {
                reason: format!(
                    "length mismatch: {} dates, {} daily, {} cumulative",
                    n,
                    self.daily_results.len(),
                    self.cumulative.len()
                ),
            });
        }

        let mut previous: Option<NaiveDate> = None;
        for raw in &self.dates {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| AnalysisError::InvalidPayload {
                reason: format!("malformed date {:?}", raw),
            })?;
            if previous.is_some_and(|p| p >= date) {
                return Err(AnalysisError::InvalidPayload {
                    reason: format!("dates not strictly ascending at {}", raw),
                });
            }
            previous = Some(date);
        }

        if let Some(i) = self.cumulative.windows(2).position(|w| w[0] > w[1]) {
            return Err(AnalysisError::InvalidPayload {
                reason: format!("cumulative decreases after {}", self.dates[i]),
            });
        }
        Ok(())
    }

    /// Date, daily and cumulative triples for console previews.
    pub fn series_rows(&self) -> impl Iterator<Item = (&str, u64, u64)> {
        self.dates
            .iter()
            .zip(&self.daily_results)
            .zip(&self.cumulative)
            .map(|((d, daily), cum)| (d.as_str(), *daily, *cum))
    }
}

/// Compute one payload.
///
/// The window is built first so configuration errors surface before any
/// aggregation work. Everything after that is infallible.
pub fn build_payload(ctx: &ReportContext, data: ReportData<'_>, scope: &Scope) -> Result<ReportPayload, AnalysisError> {
    let window = build_day_window(ctx.now, &ctx.timezone, ctx.days)?;

    let (run_ids, plan_id) = match scope {
        Scope::Global(run_ids) => (run_ids.clone(), None),
        Scope::Plan(plan_id) => (data.plans.runs_of(*plan_id), Some(*plan_id)),
    };
    let store = data.store.restricted_to(&run_ids);

    let series = compute_execution_series(&store, &window, &ctx.executed);
    let summary = build_run_summaries(&store, data.metadata, &run_ids);
    let reconciled = reconcile(&series, summary.grand.executed);
    let rows: Vec<RunSummaryRow> = summary.rows.iter().map(|row| data.plans.resolve_row(row)).collect();
    let groups = group_by_plan(&rows, data.plans);

    tracing::debug!(
        ?plan_id,
        runs = run_ids.len(),
        timelines = store.len(),
        before_window = series.before_window,
        deficit = reconciled.deficit,
        "payload computed"
    );

    Ok(ReportPayload {
        report_id: ctx.report_id,
        generated_for_date: ctx.timezone.local_date(ctx.now).format("%Y-%m-%d").to_string(),
        timezone: ctx.timezone.to_string(),
        plan_id,
        plan_name: plan_id.map(|id| data.plans.display_name(id)),
        dates: reconciled
            .series
            .dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect(),
        daily_results: reconciled.series.daily_first_executed,
        cumulative: reconciled.series.cumulative_executed,
        before_window: series.before_window,
        rows,
        groups,
        grand_percentages: Percentages::of(&summary.grand),
        grand: summary.grand,
        source_discrepancy: reconciled.deficit,
        milestones: data.milestones.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summary::{Counters, RunDescriptor, StatusCounters};
    use crate::analysis::timeline::{Observation, StatusId};

    fn ctx(days: u32) -> ReportContext {
        ReportContext {
            report_id: Uuid::nil(),
            // 2024-03-10 12:00:00 UTC
            now: DateTime::from_timestamp(1_710_072_000, 0).unwrap(),
            timezone: ReportTimezone::utc(),
            days,
            executed: ExecutedStatusSet::default(),
        }
    }

    fn obs(run_id: u64, test_id: u64, timestamp: i64, status: StatusId) -> Observation {
        Observation {
            run_id,
            test_id,
            timestamp,
            status,
        }
    }

    fn fixture() -> (TimelineStore, BTreeMap<u64, RunMetadata>, PlanIndex) {
        let day = 86_400;
        let mar9 = 1_709_942_400;
        let store = TimelineStore::from_observations([
            obs(10, 1, mar9 + 100, StatusId::PASSED),
            obs(10, 2, mar9 + day + 100, StatusId::FAILED),
            obs(20, 1, mar9 - 5 * day, StatusId::PASSED),
        ]);
        let metadata = BTreeMap::from([(
            10,
            RunMetadata {
                descriptor: RunDescriptor {
                    name: Some("Smoke (Chrome)".to_string()),
                    plan_id: Some(7),
                    plan_name: Some("Release".to_string()),
                    ..Default::default()
                },
                counters: Counters::Available(StatusCounters {
                    passed: 3,
                    failed: 2,
                    untested: 1,
                    ..Default::default()
                }),
            },
        )]);
        let mut plans = PlanIndex::new();
        plans.add_plan(7, Some("Release"), &[10]);
        (store, metadata, plans)
    }

    #[test]
    fn test_global_payload_is_reconciled() {
        let (store, metadata, plans) = fixture();
        let data = ReportData {
            store: &store,
            metadata: &metadata,
            plans: &plans,
            milestones: &[],
        };
        let payload = build_payload(&ctx(2), data, &Scope::Global(BTreeSet::from([10, 20]))).unwrap();

        assert_eq!(payload.dates, vec!["2024-03-09", "2024-03-10"]);
        assert_eq!(payload.daily_results, vec![1, 1]);
        assert_eq!(payload.before_window, 1);
        // Observed 3 by the last day; run 10 reports 5 executed plus run 20 observed 1.
        assert_eq!(payload.grand.executed, 6);
        assert_eq!(payload.source_discrepancy, 3);
        assert_eq!(payload.cumulative, vec![5, 6]);
        assert_eq!(payload.generated_for_date, "2024-03-10");
        assert_eq!(payload.plan_id, None);
        assert_eq!(payload.groups.len(), 2);
        assert_eq!(payload.grand_percentages, Percentages::of(&payload.grand));
        assert_eq!(payload.grand_percentages.executed, 85.7);
        assert_eq!(payload.grand_percentages.passed, 66.7);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_rows_carry_configured_plan_name() {
        let store = TimelineStore::from_observations([obs(10, 1, 1_709_942_500, StatusId::PASSED)]);
        let metadata = BTreeMap::from([(
            10,
            RunMetadata {
                descriptor: RunDescriptor {
                    name: Some("Smoke".to_string()),
                    plan_id: Some(222),
                    ..Default::default()
                },
                counters: Counters::Unavailable,
            },
        )]);
        let plans = PlanIndex::with_names(BTreeMap::from([(222, "Release 5.1".to_string())]));
        let data = ReportData {
            store: &store,
            metadata: &metadata,
            plans: &plans,
            milestones: &[],
        };
        let payload = build_payload(&ctx(2), data, &Scope::Global(BTreeSet::from([10]))).unwrap();

        assert_eq!(payload.rows[0].plan_key, "Release 5.1");
        assert_eq!(payload.rows[0].plan_id, Some(222));
        assert_eq!(payload.groups[0].plan_key, payload.rows[0].plan_key);
        assert_eq!(payload.groups[0].rows, payload.rows);
    }

    #[test]
    fn test_plan_payload_restricts_runs() {
        let (store, metadata, plans) = fixture();
        let data = ReportData {
            store: &store,
            metadata: &metadata,
            plans: &plans,
            milestones: &[],
        };
        let payload = build_payload(&ctx(2), data, &Scope::Plan(7)).unwrap();
        assert_eq!(payload.plan_id, Some(7));
        assert_eq!(payload.plan_name.as_deref(), Some("Release"));
        assert_eq!(payload.rows.len(), 1);
        assert_eq!(payload.rows[0].run_label, "Smoke [Chrome]");
        assert_eq!(payload.before_window, 0);
        assert_eq!(payload.cumulative.last(), Some(&5));
    }

    #[test]
    fn test_zero_days_is_a_configuration_error() {
        let (store, metadata, plans) = fixture();
        let data = ReportData {
            store: &store,
            metadata: &metadata,
            plans: &plans,
            milestones: &[],
        };
        let result = build_payload(&ctx(0), data, &Scope::Global(BTreeSet::new()));
        assert!(matches!(result, Err(AnalysisError::InvalidWindow { days: 0 })));
    }

    #[test]
    fn test_validate_rejects_bad_payloads() {
        let (store, metadata, plans) = fixture();
        let data = ReportData {
            store: &store,
            metadata: &metadata,
            plans: &plans,
            milestones: &[],
        };
        let good = build_payload(&ctx(3), data, &Scope::Global(BTreeSet::from([10]))).unwrap();

        let mut short = good.clone();
        short.cumulative.pop();
        assert!(short.validate().is_err());

        let mut unordered = good.clone();
        unordered.dates.swap(0, 1);
        assert!(unordered.validate().is_err());

        let mut decreasing = good.clone();
        decreasing.cumulative = vec![3, 2, 4];
        assert!(decreasing.validate().is_err());

        let mut garbage = good;
        garbage.dates[0] = "yesterday".to_string();
        assert!(garbage.validate().is_err());
    }

    #[test]
    fn test_payload_json_round_trip_keeps_keys() {
        let (store, metadata, plans) = fixture();
        let data = ReportData {
            store: &store,
            metadata: &metadata,
            plans: &plans,
            milestones: &[],
        };
        let payload = build_payload(&ctx(2), data, &Scope::Plan(7)).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        for key in ["dates", "daily_results", "cumulative", "rows", "grand", "source_discrepancy"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["grand"]["Executed"], 5);
        let back: ReportPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.rows, payload.rows);
        assert_eq!(back.cumulative, payload.cumulative);
        assert_eq!(back.plan_name, payload.plan_name);
    }
}
