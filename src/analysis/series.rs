//! Execution-series aggregation: daily first-execution counts and the
//! cumulative executed count over a day window.

use super::calendar::DayWindow;
use super::timeline::{ExecutedStatusSet, TimelineStore};
use chrono::NaiveDate;
use serde::Serialize;

/// Where a first-executed timestamp lands relative to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    BeforeWindow,
    Day(usize),
}

/// Classify a timestamp against the window. Timestamps past the last day
/// are clamped onto it.
pub fn classify(ts: i64, window: &DayWindow) -> Placement {
    if ts < window.first().utc_start {
        return Placement::BeforeWindow;
    }
    if ts > window.last().utc_end {
        return Placement::Day(window.len() - 1);
    }
    match window.locate(ts) {
        Some(idx) => Placement::Day(idx),
        // Buckets are contiguous, so this only happens for hand-built
        // windows with gaps; attribute to the next day that starts later.
        None => Placement::Day(
            window
                .days()
                .partition_point(|d| d.utc_end < ts)
                .min(window.len() - 1),
        ),
    }
}

/// Daily and cumulative first-execution counts, aligned with the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionSeries {
    pub dates: Vec<NaiveDate>,
    pub daily_first_executed: Vec<u64>,
    pub cumulative_executed: Vec<u64>,
    /// Pairs first executed before the window opened.
    pub before_window: u64,
}

impl ExecutionSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Cumulative count on the last day.
    pub fn total_executed(&self) -> u64 {
        self.cumulative_executed.last().copied().unwrap_or(0)
    }

    pub fn is_non_decreasing(&self) -> bool {
        self.cumulative_executed.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Compute the execution series for every timeline in `store`.
pub fn compute_execution_series(
    store: &TimelineStore,
    window: &DayWindow,
    executed: &ExecutedStatusSet,
) -> ExecutionSeries {
    let mut daily = vec![0u64; window.len()];
    let mut before_window = 0u64;

    for (_, timeline) in store.iter() {
        let Some(first) = timeline.first_executed(executed) else {
            continue;
        };
        match classify(first.timestamp, window) {
            Placement::BeforeWindow => before_window += 1,
            Placement::Day(idx) => daily[idx] += 1,
        }
    }

    let mut cumulative = Vec::with_capacity(daily.len());
    let mut running = before_window;
    for count in &daily {
        running += count;
        cumulative.push(running);
    }

    ExecutionSeries {
        dates: window.dates(),
        daily_first_executed: daily,
        cumulative_executed: cumulative,
        before_window,
    }
}
