//! Report orchestration: fetch (or load), compute, validate, write.

pub mod fetch;
pub mod snapshot;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::analysis::{
    build_day_window, build_milestone_rows, build_payload, AnalysisError, MilestoneRow, PlanIndex, ReportContext,
    ReportData, ReportPayload, ReportTimezone, Scope,
};
use crate::config::{RailReportConfig, ReportConfig};
use crate::testrail::{TestRailClient, TestRailSource};

pub use fetch::FetchedData;
pub use snapshot::Snapshot;

pub const GLOBAL_OUTPUT: &str = "results.json";

/// What one invocation produced.
#[derive(Debug)]
pub struct ReportOutcome {
    pub report_id: Uuid,
    pub global: ReportPayload,
    pub files: Vec<PathBuf>,
}

pub fn plan_output_name(plan_id: u64) -> String {
    format!("results_plan_{}.json", plan_id)
}

/// Resolve timezone and window size. Runs before any fetch so a bad
/// configuration never costs a network round-trip.
pub fn report_context(report: &ReportConfig, now: DateTime<Utc>) -> Result<ReportContext, AnalysisError> {
    let timezone = ReportTimezone::resolve(&report.timezone, report.fallback_utc_offset_hours)?;
    build_day_window(now, &timezone, report.days)?;
    Ok(ReportContext {
        report_id: Uuid::new_v4(),
        now,
        timezone,
        days: report.days,
        executed: report.executed_set(),
    })
}

/// Fetch from TestRail and write every payload.
pub async fn run_report(config: &RailReportConfig, now: DateTime<Utc>, save_snapshot: Option<&Path>) -> Result<ReportOutcome> {
    let ctx = report_context(&config.report, now).context("invalid report configuration")?;
    let client = TestRailClient::new(&config.testrail)?;
    let span = tracing::info_span!("report", report_id = %ctx.report_id);

    async {
        let data = collect(&client, &config.report).await;
        if let Some(path) = save_snapshot {
            Snapshot::capture(&data, now).save(path)?;
        }
        write_reports(&ctx, &data, &config.report)
    }
    .instrument(span)
    .await
}

/// Rebuild every payload from a snapshot, without network access.
pub fn run_offline(config: &RailReportConfig, snapshot_path: &Path, now: DateTime<Utc>) -> Result<ReportOutcome> {
    let ctx = report_context(&config.report, now).context("invalid report configuration")?;
    let _span = tracing::info_span!("report", report_id = %ctx.report_id, offline = true).entered();

    let data = Snapshot::load(snapshot_path)?.into_fetched();
    write_reports(&ctx, &data, &config.report)
}

async fn collect<S: TestRailSource + ?Sized>(source: &S, report: &ReportConfig) -> FetchedData {
    info!(
        plans = report.plan_ids.len(),
        runs = report.run_ids.len(),
        milestones = report.milestone_ids.len(),
        workers = report.workers(),
        "fetching from TestRail"
    );
    fetch::fetch_all(source, report).await
}

/// Build, validate and write the global payload and one payload per plan.
pub fn write_reports(ctx: &ReportContext, data: &FetchedData, report: &ReportConfig) -> Result<ReportOutcome> {
    let plans = PlanIndex::from_plans(report.plan_names(), &data.plans);
    let milestones: Vec<MilestoneRow> = build_milestone_rows(&data.milestones, ctx.now);
    let inputs = ReportData {
        store: &data.store,
        metadata: &data.metadata,
        plans: &plans,
        milestones: &milestones,
    };

    std::fs::create_dir_all(&report.output_dir)
        .with_context(|| format!("failed to create output dir {}", report.output_dir.display()))?;

    let global = build_payload(ctx, inputs, &Scope::Global(data.run_ids.clone()))?;
    let mut files = vec![write_payload(&global, &report.output_dir.join(GLOBAL_OUTPUT))?];

    for plan in &data.plans {
        let payload = build_payload(ctx, inputs, &Scope::Plan(plan.id))?;
        files.push(write_payload(&payload, &report.output_dir.join(plan_output_name(plan.id)))?);
    }

    info!(
        days = ctx.days,
        timezone = %ctx.timezone,
        runs = global.rows.len(),
        executed = global.grand.executed,
        discrepancy = global.source_discrepancy,
        files = files.len(),
        "report written"
    );
    Ok(ReportOutcome {
        report_id: ctx.report_id,
        global,
        files,
    })
}

fn write_payload(payload: &ReportPayload, path: &Path) -> Result<PathBuf> {
    payload
        .validate()
        .with_context(|| format!("refusing to write {}", path.display()))?;
    let json = serde_json::to_string_pretty(payload)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), plan_id = ?payload.plan_id, "wrote payload");
    Ok(path.to_path_buf())
}

/// Fetch the configured milestones for a console preview.
pub async fn milestone_preview(config: &RailReportConfig, now: DateTime<Utc>) -> Result<Vec<MilestoneRow>> {
    let client = TestRailClient::new(&config.testrail)?;
    let milestones = fetch::fetch_milestones(&client, &config.report.milestone_ids, config.report.workers()).await;
    Ok(build_milestone_rows(&milestones, now))
}

/// Load and validate a payload written earlier.
pub fn check_payload(path: &Path) -> Result<ReportPayload> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let payload: ReportPayload =
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
    payload.validate()?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Observation, PlanSummary, StatusId, TimelineStore};
    use std::collections::{BTreeMap, BTreeSet};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-10T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_bad_config_rejected_before_work() {
        let report = ReportConfig {
            days: 0,
            ..ReportConfig::default()
        };
        assert!(matches!(
            report_context(&report, now()),
            Err(AnalysisError::InvalidWindow { days: 0 })
        ));

        let report = ReportConfig {
            fallback_utc_offset_hours: 30,
            ..ReportConfig::default()
        };
        assert!(report_context(&report, now()).is_err());
    }

    #[test]
    fn test_write_reports_creates_global_and_plan_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = ReportConfig {
            days: 3,
            output_dir: dir.path().join("out"),
            ..ReportConfig::default()
        };
        let data = FetchedData {
            run_ids: BTreeSet::from([10, 11]),
            store: TimelineStore::from_observations([
                Observation {
                    run_id: 10,
                    test_id: 1,
                    timestamp: 1_710_000_000,
                    status: StatusId::PASSED,
                },
                Observation {
                    run_id: 11,
                    test_id: 1,
                    timestamp: 1_710_050_000,
                    status: StatusId::FAILED,
                },
            ]),
            metadata: BTreeMap::new(),
            plans: vec![PlanSummary {
                id: 5,
                name: Some("Sprint".to_string()),
                is_completed: false,
                created_on: None,
                run_ids: vec![10],
            }],
            milestones: Vec::new(),
        };

        let ctx = report_context(&report, now()).unwrap();
        let outcome = write_reports(&ctx, &data, &report).unwrap();
        assert_eq!(outcome.files.len(), 2);
        assert!(report.output_dir.join(GLOBAL_OUTPUT).exists());
        assert!(report.output_dir.join("results_plan_5.json").exists());
        assert_eq!(outcome.global.grand.executed, 2);
        assert_eq!(outcome.global.cumulative.last(), Some(&2));

        let plan = check_payload(&report.output_dir.join("results_plan_5.json")).unwrap();
        assert_eq!(plan.plan_name.as_deref(), Some("Sprint"));
        assert_eq!(plan.rows.len(), 1);
    }
}
