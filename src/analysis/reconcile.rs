//! Reconcile the window-based cumulative series with an authoritative
//! executed count.

use super::series::ExecutionSeries;

/// A reconciled series and the deficit that was padded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub series: ExecutionSeries,
    pub deficit: u64,
}

/// Pad the cumulative series so its last value reaches
/// `authoritative_executed`.
///
/// Executions whose day cannot be attributed are treated as done before the
/// window opened: the deficit is added to every day, not only the tail.
/// Applying this twice with the same total is a no-op the second time.
pub fn reconcile(series: &ExecutionSeries, authoritative_executed: u64) -> Reconciliation {
    let deficit = authoritative_executed.saturating_sub(series.total_executed());

    let mut cumulative: Vec<u64> = series
        .cumulative_executed
        .iter()
        .map(|v| v + deficit)
        .collect();

    // Re-clamp to non-decreasing.
    let mut floor = 0;
    for v in cumulative.iter_mut() {
        floor = floor.max(*v);
        *v = floor;
    }

    if deficit > 0 {
        tracing::debug!(
            deficit,
            observed = series.total_executed(),
            authoritative = authoritative_executed,
            "padded cumulative series"
        );
    }

    Reconciliation {
        series: ExecutionSeries {
            cumulative_executed: cumulative,
            ..series.clone()
        },
        deficit,
    }
}
