//! Bounded fan-out over a [`TestRailSource`] with a fan-in barrier.
//!
//! Every task returns its own partial result. Nothing is merged into the
//! timeline store or metadata map until the whole phase has completed.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::analysis::{Milestone, PlanSummary, RunMetadata, TimelineStore};
use crate::config::ReportConfig;
use crate::testrail::{FetchError, TestRailSource};

/// Everything one report invocation needs, fetched or loaded.
#[derive(Debug, Clone, Default)]
pub struct FetchedData {
    /// Runs covered by the global payload.
    pub run_ids: BTreeSet<u64>,
    pub store: TimelineStore,
    pub metadata: BTreeMap<u64, RunMetadata>,
    /// Configured plans that could be fetched.
    pub plans: Vec<PlanSummary>,
    pub milestones: Vec<Milestone>,
}

/// Run `task` for every id with at most `workers` in flight. Results come
/// back in completion order.
async fn fan_out<T, F, Fut>(ids: impl IntoIterator<Item = u64>, workers: usize, task: F) -> Vec<(u64, T)>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(ids)
        .map(|id| {
            let fut = task(id);
            async move { (id, fut.await) }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

/// Fetch plans; failed plans are logged and skipped.
pub async fn fetch_plans<S: TestRailSource + ?Sized>(source: &S, plan_ids: &[u64], workers: usize) -> Vec<PlanSummary> {
    let unique: BTreeSet<u64> = plan_ids.iter().copied().collect();
    let outcomes = fan_out(unique, workers, |id| source.plan(id)).await;

    let mut plans: Vec<PlanSummary> = outcomes
        .into_iter()
        .filter_map(|(plan_id, outcome)| match outcome {
            Ok(plan) => Some(plan),
            Err(e) => {
                warn!(plan_id, error = %e, "plan fetch failed, its runs are skipped");
                None
            }
        })
        .collect();
    plans.sort_by_key(|p| p.id);
    plans
}

/// Fetch results and metadata of every run.
///
/// A failed results fetch leaves the run without observations; a failed
/// metadata fetch leaves it without metadata. Neither aborts the phase.
pub async fn fetch_runs<S: TestRailSource + ?Sized>(
    source: &S,
    run_ids: &BTreeSet<u64>,
    workers: usize,
) -> (TimelineStore, BTreeMap<u64, RunMetadata>) {
    let outcomes = fan_out(run_ids.iter().copied(), workers, |id| async move {
        futures::join!(source.run_results(id), source.run_metadata(id))
    })
    .await;

    // Fan-in: single-threaded merge after every task has finished.
    let mut store = TimelineStore::new();
    let mut metadata = BTreeMap::new();
    let mut failed = 0usize;
    for (run_id, (results, meta)) in outcomes {
        match results {
            Ok(observations) => store.extend(observations),
            Err(e) => {
                failed += 1;
                warn!(run_id, error = %e, "results fetch failed, run has no observations");
            }
        }
        match meta {
            Ok(m) => {
                metadata.insert(run_id, m);
            }
            Err(e) => warn!(run_id, error = %e, "run metadata fetch failed, using observed tallies"),
        }
    }

    info!(
        runs = run_ids.len(),
        failed,
        timelines = store.len(),
        with_metadata = metadata.len(),
        "run fetch complete"
    );
    (store, metadata)
}

/// Fetch milestones; failures are logged and skipped.
pub async fn fetch_milestones<S: TestRailSource + ?Sized>(source: &S, ids: &[u64], workers: usize) -> Vec<Milestone> {
    let unique: BTreeSet<u64> = ids.iter().copied().collect();
    let outcomes = fan_out(unique, workers, |id| source.milestone(id)).await;

    let mut milestones: Vec<Milestone> = outcomes
        .into_iter()
        .filter_map(|(milestone_id, outcome): (u64, Result<Milestone, FetchError>)| match outcome {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(milestone_id, error = %e, "milestone fetch failed, skipping");
                None
            }
        })
        .collect();
    milestones.sort_by_key(|m| m.id);
    milestones
}

/// Plans first (their runs widen the run set), then runs and milestones.
pub async fn fetch_all<S: TestRailSource + ?Sized>(source: &S, report: &ReportConfig) -> FetchedData {
    let workers = report.workers();
    let plans = fetch_plans(source, &report.plan_ids, workers).await;

    let mut run_ids: BTreeSet<u64> = report.run_ids.iter().copied().collect();
    run_ids.extend(plans.iter().flat_map(|p| p.run_ids.iter().copied()));

    let (store, metadata) = fetch_runs(source, &run_ids, workers).await;
    let milestones = fetch_milestones(source, &report.milestone_ids, workers).await;

    FetchedData {
        run_ids,
        store,
        metadata,
        plans,
        milestones,
    }
}
