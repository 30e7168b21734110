//! Execution-series aggregation and run/plan reconciliation.
//!
//! Everything in here is synchronous and pure: the fetch layer fills a
//! [`TimelineStore`] and a metadata map, then [`build_payload`] turns them
//! into the payload written to disk. Configuration problems (bad window,
//! bad timezone offset) are reported before any aggregation starts.

pub mod calendar;
pub mod grouping;
pub mod milestones;
pub mod payload;
pub mod reconcile;
pub mod series;
pub mod summary;
pub mod timeline;

use chrono::NaiveDate;
use thiserror::Error;

pub use calendar::{build_day_window, MAX_WINDOW_DAYS, DayBucket, DayWindow, ReportTimezone};
pub use grouping::{group_by_plan, PlanGroup, PlanIndex, PlanSummary};
pub use milestones::{build_milestone_rows, Milestone, MilestoneRow, MilestoneStatus};
pub use payload::{build_payload, ReportContext, ReportData, ReportPayload, Scope};
pub use reconcile::{reconcile, Reconciliation};
pub use series::{compute_execution_series, ExecutionSeries};
pub use summary::{build_run_summaries, Counters, GrandTotals, RunDescriptor, RunMetadata, RunSummary, RunSummaryRow, StatusCounters};
pub use timeline::{ExecutedStatusSet, Observation, StatusId, TimelineStore};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid report window: {days} days (must be between 1 and {max})", max = calendar::MAX_WINDOW_DAYS)]
    InvalidWindow { days: u32 },

    #[error("invalid fallback UTC offset: {hours} hours")]
    InvalidTimezoneOffset { hours: i32 },

    #[error("day buckets overlap or are inverted at {date}")]
    OverlappingDays { date: NaiveDate },

    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },
}
