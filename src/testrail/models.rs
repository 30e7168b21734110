//! Wire shapes of the TestRail API v2 and their conversion into the
//! analysis types.

use crate::analysis::{Counters, Milestone, Observation, PlanSummary, RunDescriptor, RunMetadata, StatusCounters, StatusId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Links {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(alias = "results", alias = "plans", alias = "runs")]
    pub items: Vec<T>,
    #[serde(default, rename = "_links")]
    pub links: Option<Links>,
}

/// Listing endpoints return either a paged envelope or, on older servers,
/// a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PageResponse<T> {
    Envelope(Page<T>),
    Bare(Vec<T>),
}

impl<T> PageResponse<T> {
    /// Items plus whether the server says there is another page
    /// (`None` when it does not say).
    pub fn into_parts(self) -> (Vec<T>, Option<bool>) {
        match self {
            Self::Envelope(page) => {
                let more = page.links.map(|l| l.next.is_some());
                (page.items, more)
            }
            Self::Bare(items) => (items, None),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiResult {
    pub test_id: u64,
    pub status_id: Option<u8>,
    pub created_on: i64,
}

impl ApiResult {
    /// Comment-only results carry no status and are not observations.
    pub fn into_observation(self, run_id: u64) -> Option<Observation> {
        self.status_id.map(|status| Observation {
            run_id,
            test_id: self.test_id,
            timestamp: self.created_on,
            status: StatusId(status),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiRun {
    pub id: u64,
    pub name: Option<String>,
    pub config: Option<String>,
    pub plan_id: Option<u64>,
    pub passed_count: Option<u64>,
    pub blocked_count: Option<u64>,
    pub untested_count: Option<u64>,
    pub retest_count: Option<u64>,
    pub failed_count: Option<u64>,
}

impl From<ApiRun> for RunMetadata {
    fn from(run: ApiRun) -> Self {
        let counters = match (
            run.passed_count,
            run.blocked_count,
            run.untested_count,
            run.retest_count,
            run.failed_count,
        ) {
            (Some(passed), Some(blocked), Some(untested), Some(retest), Some(failed)) => {
                Counters::Available(StatusCounters {
                    passed,
                    blocked,
                    untested,
                    retest,
                    failed,
                })
            }
            _ => Counters::Unavailable,
        };
        RunMetadata {
            descriptor: RunDescriptor {
                name: run.name,
                config: run.config,
                plan_id: run.plan_id,
                plan_name: None,
            },
            counters,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiPlanRun {
    pub id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPlanEntry {
    #[serde(default)]
    pub runs: Vec<ApiPlanRun>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPlan {
    pub id: u64,
    pub name: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    pub created_on: Option<i64>,
    #[serde(default)]
    pub entries: Vec<ApiPlanEntry>,
}

impl From<ApiPlan> for PlanSummary {
    fn from(plan: ApiPlan) -> Self {
        let mut run_ids: Vec<u64> = plan
            .entries
            .iter()
            .flat_map(|e| e.runs.iter().filter_map(|r| r.id))
            .collect();
        run_ids.sort_unstable();
        run_ids.dedup();
        PlanSummary {
            id: plan.id,
            name: plan.name,
            is_completed: plan.is_completed,
            created_on: plan.created_on,
            run_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiMilestone {
    pub id: u64,
    pub name: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    pub start_on: Option<i64>,
    pub due_on: Option<i64>,
}

impl From<ApiMilestone> for Milestone {
    fn from(m: ApiMilestone) -> Self {
        Milestone {
            id: m.id,
            name: m.name.unwrap_or_else(|| "Unnamed".to_string()),
            is_completed: m.is_completed,
            start_on: m.start_on,
            due_on: m.due_on,
        }
    }
}
