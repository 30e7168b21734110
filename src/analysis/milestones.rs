//! Milestone status classification and ordering.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MilestoneStatus {
    Completed,
    #[serde(rename = "In progress")]
    InProgress,
    Planned,
}

impl MilestoneStatus {
    /// Completed wins; otherwise a milestone is in progress once its start
    /// date has passed, and planned before that or without a start. A zero
    /// start counts as missing.
    pub fn classify(is_completed: bool, start_on: Option<i64>, now: DateTime<Utc>) -> Self {
        if is_completed {
            return Self::Completed;
        }
        match start_on.filter(|&t| t != 0) {
            Some(start) if start <= now.timestamp() => Self::InProgress,
            _ => Self::Planned,
        }
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::InProgress => write!(f, "In progress"),
            Self::Planned => write!(f, "Planned"),
        }
    }
}

/// Milestone fields as delivered by the fetch layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: u64,
    pub name: String,
    pub is_completed: bool,
    pub start_on: Option<i64>,
    pub due_on: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRow {
    pub id: u64,
    pub name: String,
    pub status: MilestoneStatus,
    /// `YYYY-MM-DD` or `TBD`.
    pub start: String,
    pub due: String,
}

fn format_day(ts: Option<i64>) -> String {
    ts.filter(|&t| t != 0)
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "TBD".to_string())
}

fn start_date(m: &Milestone) -> Option<NaiveDate> {
    m.start_on
        .filter(|&t| t != 0)
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|dt| dt.date_naive())
}

/// Rows ordered by start date, milestones without a start last, ties by id.
pub fn build_milestone_rows(milestones: &[Milestone], now: DateTime<Utc>) -> Vec<MilestoneRow> {
    let mut sorted: Vec<&Milestone> = milestones.iter().collect();
    sorted.sort_by_key(|m| (start_date(m).is_none(), start_date(m), m.id));

    sorted
        .into_iter()
        .map(|m| MilestoneRow {
            id: m.id,
            name: m.name.clone(),
            status: MilestoneStatus::classify(m.is_completed, m.start_on, now),
            start: format_day(m.start_on),
            due: format_day(m.due_on),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn milestone(id: u64, start_on: Option<i64>, is_completed: bool) -> Milestone {
        Milestone {
            id,
            name: format!("M{}", id),
            is_completed,
            start_on,
            due_on: None,
        }
    }

    #[test]
    fn test_classify() {
        let t = now().timestamp();
        assert_eq!(MilestoneStatus::classify(true, None, now()), MilestoneStatus::Completed);
        assert_eq!(MilestoneStatus::classify(false, None, now()), MilestoneStatus::Planned);
        assert_eq!(MilestoneStatus::classify(false, Some(t + 10), now()), MilestoneStatus::Planned);
        assert_eq!(MilestoneStatus::classify(false, Some(t), now()), MilestoneStatus::InProgress);
    }

    #[test]
    fn test_rows_ordered_by_start_missing_last() {
        let rows = build_milestone_rows(
            &[
                milestone(3, None, false),
                milestone(2, Some(1_600_000_000), true),
                milestone(1, Some(1_650_000_000), false),
                milestone(4, Some(1_600_000_000), false),
            ],
            now(),
        );
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
        assert_eq!(rows[0].start, "2020-09-13");
        assert_eq!(rows[3].start, "TBD");
        assert_eq!(rows[3].due, "TBD");
        assert_eq!(rows[0].status, MilestoneStatus::Completed);
        assert_eq!(rows[2].status, MilestoneStatus::InProgress);
    }

    #[test]
    fn test_zero_start_is_planned() {
        assert_eq!(MilestoneStatus::classify(false, Some(0), now()), MilestoneStatus::Planned);
        let rows = build_milestone_rows(&[milestone(5, Some(0), false)], now());
        assert_eq!(rows[0].start, "TBD");
        assert_eq!(rows[0].status, MilestoneStatus::Planned);
    }

    #[test]
    fn test_status_serializes_as_label() {
        let json = serde_json::to_string(&MilestoneStatus::InProgress).unwrap();
        assert_eq!(json, "\"In progress\"");
    }
}
