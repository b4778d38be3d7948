//! Streak calculation.
//!
//! A streak is the number of consecutive calendar days with at least one
//! qualifying activity. Calendar days are taken in one fixed UTC offset so
//! that "same day" and "yesterday" never depend on the server's local zone.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

/// How an activity moved the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// First qualifying activity ever
    Started,
    /// Previous activity was yesterday
    Continued,
    /// Already active today
    Unchanged,
    /// Gap of one or more days
    Reset,
    /// Activity dated before the last recorded day
    Backdated,
    /// Activity does not count toward streaks
    Ignored,
}

/// Streak state after applying one activity day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakOutcome {
    pub current: u32,
    pub longest: u32,
    pub last_day: Option<NaiveDate>,
    pub change: StreakChange,
}

impl StreakOutcome {
    /// Whether the current streak grew
    pub fn grew(&self, previous: u32) -> bool {
        self.current > previous
    }
}

/// Maps timestamps to calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Offset in minutes east of UTC. Out-of-range values fall back to UTC.
    pub fn from_offset_minutes(minutes: i32) -> Self {
        FixedOffset::east_opt(minutes.saturating_mul(60))
            .map(|offset| Self { offset })
            .unwrap_or_else(Self::utc)
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

/// Advance a streak with an activity on `day`.
pub fn advance_streak(
    current: u32,
    longest: u32,
    last_day: Option<NaiveDate>,
    day: NaiveDate,
) -> StreakOutcome {
    let (current, last_day, change) = match last_day {
        None => (1, Some(day), StreakChange::Started),
        Some(last) if day == last => (current, Some(last), StreakChange::Unchanged),
        Some(last) if day < last => (current, Some(last), StreakChange::Backdated),
        Some(last) if last.succ_opt() == Some(day) => {
            (current.saturating_add(1), Some(day), StreakChange::Continued)
        }
        Some(_) => (1, Some(day), StreakChange::Reset),
    };

    StreakOutcome {
        current,
        longest: longest.max(current),
        last_day,
        change,
    }
}

/// Bonus XP for growing a streak to `streak` days
pub fn streak_bonus(streak: u32) -> u64 {
    if streak >= 30 {
        50
    } else if streak >= 14 {
        25
    } else if streak >= 7 {
        15
    } else if streak >= 3 {
        10
    } else {
        5
    }
}
