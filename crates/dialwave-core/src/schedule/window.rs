//! Daily calling windows evaluated in a campaign's effective timezone

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::warn;

/// Upper bound on how far ahead `next_window_start` searches
const MAX_SEARCH_DAYS: i64 = 366;

/// Longest DST gap we step over when a window opens inside one
const MAX_GAP_MINUTES: i64 = 180;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid call time {0:?}: expected HH:MM between 00:00 and 23:59")]
    InvalidTime(String),
}

/// Local wall-clock calling window, inclusive at both ends, minute resolution
///
/// `last < first` means the window crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallWindow {
    first: NaiveTime,
    last: NaiveTime,
}

impl CallWindow {
    /// Parse `HH:MM` window bounds, rejecting anything malformed
    pub fn parse(first: &str, last: &str) -> Result<Self, WindowError> {
        Ok(Self {
            first: parse_call_time(first)?,
            last: parse_call_time(last)?,
        })
    }

    /// Parse window bounds for evaluation. Bad input was supposed to be
    /// rejected at creation time; here it degrades to an always-open window.
    pub fn lenient(first: &str, last: &str) -> Self {
        match Self::parse(first, last) {
            Ok(window) => window,
            Err(e) => {
                warn!(first, last, error = %e, "Malformed call window, treating as always open");
                Self::always_open()
            }
        }
    }

    /// 00:00 through 23:59
    pub fn always_open() -> Self {
        Self {
            first: NaiveTime::MIN,
            last: hm(23, 59),
        }
    }

    pub fn first(&self) -> NaiveTime {
        self.first
    }

    pub fn last(&self) -> NaiveTime {
        self.last
    }

    pub fn crosses_midnight(&self) -> bool {
        self.last < self.first
    }

    /// Whether a local wall-clock time is inside the window
    pub fn contains(&self, local: NaiveTime) -> bool {
        let t = truncate_to_minute(local);
        if self.crosses_midnight() {
            t >= self.first || t <= self.last
        } else {
            t >= self.first && t <= self.last
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    hm(t.hour(), t.minute())
}

/// Parse `HH:MM` (or `HH:MM:SS`, seconds ignored)
pub fn parse_call_time(value: &str) -> Result<NaiveTime, WindowError> {
    let invalid = || WindowError::InvalidTime(value.to_string());
    let trimmed = value.trim();
    let mut parts = trimmed.split(':');

    let hour = parts.next().ok_or_else(invalid)?;
    let minute = parts.next().ok_or_else(invalid)?;
    let seconds = parts.next();
    if parts.next().is_some() {
        return Err(invalid());
    }

    let valid_field = |s: &str, max_len: usize| {
        !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !valid_field(hour, 2) || minute.len() != 2 || !valid_field(minute, 2) {
        return Err(invalid());
    }
    if let Some(s) = seconds {
        if s.len() != 2 || !valid_field(s, 2) {
            return Err(invalid());
        }
    }

    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Whether `instant`, read on the local clock of `tz`, falls inside the window.
/// The offset used is the one in effect at `instant`.
pub fn is_within_window(instant: DateTime<Utc>, window: &CallWindow, tz: Tz) -> bool {
    window.contains(instant.with_timezone(&tz).time())
}

/// Whether a local calendar date lies inside optional inclusive bounds
pub fn is_within_dates(
    date: NaiveDate,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> bool {
    start_date.map_or(true, |start| date >= start) && end_date.map_or(true, |end| date <= end)
}

/// Earliest instant at or after `after` that is inside the window and whose
/// local date lies in `[start_date, end_date]`. `None` when no such instant
/// exists before the end of `end_date` (or within the search horizon).
pub fn next_window_start(
    after: DateTime<Utc>,
    window: &CallWindow,
    tz: Tz,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Option<DateTime<Utc>> {
    let local_after = after.with_timezone(&tz);
    if window.contains(local_after.time())
        && is_within_dates(local_after.date_naive(), start_date, end_date)
    {
        return Some(after);
    }

    let mut date = local_after.date_naive();
    if let Some(start) = start_date {
        if start > date {
            date = start;
        }
    }

    for _ in 0..=MAX_SEARCH_DAYS {
        if end_date.map_or(false, |end| date > end) {
            return None;
        }

        // A window that crosses midnight is already open at 00:00.
        let mut openings = Vec::with_capacity(2);
        if window.contains(NaiveTime::MIN) {
            openings.push(NaiveTime::MIN);
        }
        openings.push(window.first);

        for opening in openings {
            let Some(candidate) = resolve_local(tz, date.and_time(opening)) else {
                continue;
            };
            if candidate >= after
                && window.contains(candidate.with_timezone(&tz).time())
                && is_within_dates(candidate.with_timezone(&tz).date_naive(), start_date, end_date)
            {
                return Some(candidate);
            }
        }

        date = date.succ_opt()?;
    }

    None
}

/// Map a local wall-clock time to an instant. Ambiguous times take the
/// earlier instant; times inside a DST gap move to the first valid minute
/// after the gap.
fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    let mut probe = local;
    for _ in 0..=MAX_GAP_MINUTES {
        match tz.from_local_datetime(&probe) {
            LocalResult::Single(t) => return Some(t.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => probe += Duration::minutes(1),
        }
    }
    None
}
