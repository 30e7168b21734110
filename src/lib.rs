//! railreport -- TestRail execution velocity and run/plan summaries.
//!
//! This crate fetches run results, run metadata, plans and milestones from
//! TestRail, reduces them to a daily first-execution series and per-run
//! summaries over a trailing window of local calendar days, reconciles the
//! series against the server's own counters, and writes JSON payloads for
//! downstream renderers.

pub mod analysis;
pub mod config;
pub mod pipeline;
pub mod testrail;

pub use analysis::{AnalysisError, ReportPayload};
pub use config::RailReportConfig;
pub use testrail::{FetchError, TestRailClient, TestRailSource};
