//! Day-bucket calendar: a trailing window of local calendar days expressed
//! as UTC epoch-second ranges.

use super::AnalysisError;
use chrono::{DateTime, Days, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

/// Timezone the report's calendar days are anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTimezone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl ReportTimezone {
    /// Resolve a timezone identifier.
    ///
    /// Accepts IANA names (`Europe/Prague`) and explicit offsets (`+02:00`,
    /// `UTC-5`, `-0330`). Anything else degrades to the fixed fallback offset
    /// with a warning. Only an out-of-range fallback offset is an error.
    pub fn resolve(identifier: &str, fallback_offset_hours: i32) -> Result<Self, AnalysisError> {
        let fallback = fallback_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(AnalysisError::InvalidTimezoneOffset {
                hours: fallback_offset_hours,
            })?;

        let trimmed = identifier.trim();
        if let Ok(tz) = trimmed.parse::<Tz>() {
            return Ok(Self::Named(tz));
        }
        if let Some(offset) = parse_offset(trimmed) {
            debug!(%trimmed, %offset, "using fixed UTC offset");
            return Ok(Self::Fixed(offset));
        }

        warn!(
            timezone = %trimmed,
            fallback = %fallback,
            "unknown timezone, falling back to fixed offset"
        );
        Ok(Self::Fixed(fallback))
    }

    pub fn utc() -> Self {
        Self::Named(Tz::UTC)
    }

    /// Local calendar date of `instant`.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Named(tz) => instant.with_timezone(tz).date_naive(),
            Self::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// Epoch seconds of the first instant of `date` in this timezone.
    pub fn day_start(&self, date: NaiveDate) -> i64 {
        match self {
            Self::Named(tz) => start_of_day(tz, date),
            Self::Fixed(offset) => start_of_day(offset, date),
        }
    }
}

impl std::fmt::Display for ReportTimezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(tz) => write!(f, "{}", tz.name()),
            Self::Fixed(offset) => write!(f, "UTC{}", offset),
        }
    }
}

fn start_of_day<Z: TimeZone>(tz: &Z, date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    let mut local = midnight;
    // Midnight may not exist locally (DST gap at 00:00); step forward
    // until the first valid instant of the day.
    for _ in 0..48 {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => return dt.timestamp(),
            LocalResult::Ambiguous(earliest, _) => return earliest.timestamp(),
            LocalResult::None => local += Duration::minutes(30),
        }
    }
    midnight.and_utc().timestamp()
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let upper = raw.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);

    let (sign, digits) = match rest.chars().next()? {
        '+' => (1, &rest[1..]),
        '-' => (-1, &rest[1..]),
        _ => return None,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }

    let (hours, minutes): (i32, i32) = match digits.split_once(':') {
        Some((h, m)) => (h.parse().ok()?, m.parse().ok()?),
        None if digits.len() == 4 => (digits[..2].parse().ok()?, digits[2..].parse().ok()?),
        None => (digits.parse().ok()?, 0),
    };
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// One local calendar day of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBucket {
    pub index: usize,
    pub date: NaiveDate,
    /// First second of the day, epoch seconds UTC (inclusive).
    pub utc_start: i64,
    /// Last second of the day, epoch seconds UTC (inclusive).
    pub utc_end: i64,
}

/// Ordered, gap-free sequence of day buckets. Day 0 is the oldest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayWindow {
    days: Vec<DayBucket>,
}

impl DayWindow {
    /// Build a window from explicit buckets, checking ordering and
    /// non-overlap. Indices are reassigned from position.
    pub fn from_buckets(buckets: Vec<DayBucket>) -> Result<Self, AnalysisError> {
        if buckets.is_empty() {
            return Err(AnalysisError::InvalidWindow { days: 0 });
        }
        for pair in buckets.windows(2) {
            if pair[0].utc_end >= pair[1].utc_start {
                return Err(AnalysisError::OverlappingDays {
                    date: pair[1].date,
                });
            }
        }
        if let Some(bad) = buckets.iter().find(|b| b.utc_start > b.utc_end) {
            return Err(AnalysisError::OverlappingDays { date: bad.date });
        }
        let days = buckets
            .into_iter()
            .enumerate()
            .map(|(index, b)| DayBucket { index, ..b })
            .collect();
        Ok(Self { days })
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Always false: a window holds at least one day.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn days(&self) -> &[DayBucket] {
        &self.days
    }

    pub fn first(&self) -> &DayBucket {
        &self.days[0]
    }

    pub fn last(&self) -> &DayBucket {
        &self.days[self.days.len() - 1]
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.days.iter().map(|d| d.date).collect()
    }

    /// Index of the day whose inclusive [start, end] range holds `ts`.
    pub fn locate(&self, ts: i64) -> Option<usize> {
        let idx = self.days.partition_point(|d| d.utc_end < ts);
        self.days
            .get(idx)
            .filter(|d| d.utc_start <= ts)
            .map(|d| d.index)
    }
}

/// Longest window accepted, roughly ten years.
pub const MAX_WINDOW_DAYS: u32 = 3660;

/// Build the trailing `num_days` window ending on the local date of `now`.
pub fn build_day_window(
    now: DateTime<Utc>,
    timezone: &ReportTimezone,
    num_days: u32,
) -> Result<DayWindow, AnalysisError> {
    if num_days == 0 || num_days > MAX_WINDOW_DAYS {
        return Err(AnalysisError::InvalidWindow { days: num_days });
    }

    let today = timezone.local_date(now);
    let first = today
        .checked_sub_days(Days::new(u64::from(num_days) - 1))
        .ok_or(AnalysisError::InvalidWindow { days: num_days })?;

    let mut days = Vec::with_capacity(num_days as usize);
    let mut date = first;
    let mut start = timezone.day_start(date);
    for index in 0..num_days as usize {
        let next = date
            .succ_opt()
            .ok_or(AnalysisError::InvalidWindow { days: num_days })?;
        let next_start = timezone.day_start(next);
        days.push(DayBucket {
            index,
            date,
            utc_start: start,
            utc_end: next_start - 1,
        });
        date = next;
        start = next_start;
    }

    debug!(
        %timezone,
        days = num_days,
        first = %first,
        last = %today,
        "built day window"
    );
    Ok(DayWindow { days })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_zero_days_rejected() {
        let err = build_day_window(at("2024-05-01T12:00:00Z"), &ReportTimezone::utc(), 0);
        assert!(matches!(err, Err(AnalysisError::InvalidWindow { days: 0 })));
    }

    #[test]
    fn test_oversized_window_rejected() {
        let now = at("2024-05-01T12:00:00Z");
        assert!(build_day_window(now, &ReportTimezone::utc(), MAX_WINDOW_DAYS).is_ok());
        let err = build_day_window(now, &ReportTimezone::utc(), 40_000_000);
        assert!(matches!(err, Err(AnalysisError::InvalidWindow { days: 40_000_000 })));
    }

    #[test]
    fn test_utc_window_shape() {
        let window = build_day_window(at("2024-05-03T08:30:00Z"), &ReportTimezone::utc(), 3).unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window.first().date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(window.last().date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
        for day in window.days() {
            assert_eq!(day.utc_end - day.utc_start + 1, 86_400);
        }
        assert_eq!(window.first().utc_start, at("2024-05-01T00:00:00Z").timestamp());
    }

    #[test]
    fn test_local_date_differs_from_utc_date() {
        // 23:30 UTC is already the next day in Prague (UTC+2 in summer).
        let tz = ReportTimezone::resolve("Europe/Prague", 0).unwrap();
        let window = build_day_window(at("2024-06-10T23:30:00Z"), &tz, 1).unwrap();
        assert_eq!(window.last().date, NaiveDate::from_ymd_opt(2024, 6, 11).unwrap());
        assert_eq!(window.last().utc_start, at("2024-06-10T22:00:00Z").timestamp());
    }

    #[test]
    fn test_dst_spring_forward_day_is_short() {
        let tz = ReportTimezone::resolve("Europe/Prague", 0).unwrap();
        let window = build_day_window(at("2024-04-01T12:00:00Z"), &tz, 3).unwrap();
        // 2024-03-31 is the switch to CEST.
        let switch = window
            .days()
            .iter()
            .find(|d| d.date == NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();
        assert_eq!(switch.utc_end - switch.utc_start + 1, 23 * 3600);
        for pair in window.days().windows(2) {
            assert_eq!(pair[0].utc_end + 1, pair[1].utc_start);
        }
    }

    #[test]
    fn test_dst_fall_back_day_is_long() {
        let tz = ReportTimezone::resolve("America/New_York", 0).unwrap();
        let window = build_day_window(at("2024-11-04T15:00:00Z"), &tz, 2).unwrap();
        let switch = &window.days()[0];
        assert_eq!(switch.date, NaiveDate::from_ymd_opt(2024, 11, 3).unwrap());
        assert_eq!(switch.utc_end - switch.utc_start + 1, 25 * 3600);
    }

    #[test]
    fn test_midnight_gap_resolves_to_first_valid_instant() {
        // Chile skips 00:00-01:00 local on the first Sunday of September 2024.
        let tz = ReportTimezone::resolve("America/Santiago", 0).unwrap();
        let window = build_day_window(at("2024-09-09T12:00:00Z"), &tz, 5).unwrap();
        for pair in window.days().windows(2) {
            assert!(pair[0].utc_start <= pair[0].utc_end);
            assert_eq!(pair[0].utc_end + 1, pair[1].utc_start);
        }
    }

    #[test]
    fn test_resolve_offsets() {
        let plus_two = FixedOffset::east_opt(7200).unwrap();
        assert_eq!(ReportTimezone::resolve("+02:00", 0).unwrap(), ReportTimezone::Fixed(plus_two));
        assert_eq!(ReportTimezone::resolve("UTC+2", 0).unwrap(), ReportTimezone::Fixed(plus_two));
        assert_eq!(
            ReportTimezone::resolve("-0330", 0).unwrap(),
            ReportTimezone::Fixed(FixedOffset::west_opt(3 * 3600 + 1800).unwrap())
        );
    }

    #[test]
    fn test_resolve_unknown_falls_back() {
        let tz = ReportTimezone::resolve("Mars/Olympus_Mons", 3).unwrap();
        assert_eq!(tz, ReportTimezone::Fixed(FixedOffset::east_opt(3 * 3600).unwrap()));
    }

    #[test]
    fn test_resolve_rejects_bad_fallback() {
        assert!(matches!(
            ReportTimezone::resolve("UTC", 99),
            Err(AnalysisError::InvalidTimezoneOffset { hours: 99 })
        ));
    }

    #[test]
    fn test_locate_inclusive_bounds() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let window = DayWindow::from_buckets(vec![
            DayBucket { index: 0, date: d, utc_start: 0, utc_end: 99 },
            DayBucket { index: 0, date: d.succ_opt().unwrap(), utc_start: 100, utc_end: 199 },
        ])
        .unwrap();
        assert_eq!(window.locate(0), Some(0));
        assert_eq!(window.locate(99), Some(0));
        assert_eq!(window.locate(100), Some(1));
        assert_eq!(window.locate(199), Some(1));
        assert_eq!(window.locate(-1), None);
        assert_eq!(window.locate(200), None);
    }

    #[test]
    fn test_from_buckets_rejects_overlap() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let result = DayWindow::from_buckets(vec![
            DayBucket { index: 0, date: d, utc_start: 0, utc_end: 100 },
            DayBucket { index: 1, date: d.succ_opt().unwrap(), utc_start: 100, utc_end: 199 },
        ]);
        assert!(matches!(result, Err(AnalysisError::OverlappingDays { .. })));
    }
}
