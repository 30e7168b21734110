//! TestRail API v2 fetch layer.
//!
//! [`TestRailSource`] is the seam the pipeline fans out over; the HTTP
//! implementation is [`TestRailClient`]. Nothing in here retries.

pub mod client;
pub mod models;

pub use client::TestRailClient;

use crate::analysis::{Milestone, Observation, PlanSummary, RunMetadata};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("TestRail credentials missing: {field} is not set")]
    MissingCredentials { field: &'static str },

    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

/// Source of TestRail data, one call per entity.
#[async_trait::async_trait]
pub trait TestRailSource: Send + Sync {
    /// All status-bearing results of a run, across every page.
    async fn run_results(&self, run_id: u64) -> Result<Vec<Observation>, FetchError>;

    async fn run_metadata(&self, run_id: u64) -> Result<RunMetadata, FetchError>;

    /// A plan with the ids of every run in its entries.
    async fn plan(&self, plan_id: u64) -> Result<PlanSummary, FetchError>;

    /// Plans of a project. Listing responses carry no entries, so
    /// `run_ids` is empty.
    async fn plans(&self, project_id: u64) -> Result<Vec<PlanSummary>, FetchError>;

    async fn milestone(&self, milestone_id: u64) -> Result<Milestone, FetchError>;
}
