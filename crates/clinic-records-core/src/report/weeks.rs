//! Week bucket generation.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::DateRange;

/// Where week buckets start.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeekAlignment {
    /// Seven-day buckets counted from the first day of the range
    #[default]
    RangeStart,
    /// Calendar weeks: the first bucket runs to the Sunday of the start week,
    /// later buckets run Monday to Sunday
    Monday,
}

/// An inclusive `[start, end]` slice of a report range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WeekBucket {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekBucket {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days covered, counting both ends.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Monday of the week containing `date`.
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// Split `range` into consecutive week buckets.
///
/// Buckets are contiguous and non-overlapping; the last one is clipped to the
/// range end.
pub fn week_buckets(range: &DateRange, alignment: WeekAlignment) -> Vec<WeekBucket> {
    let mut buckets = Vec::new();
    let mut start = range.start();

    while start <= range.end() {
        let anchor = match alignment {
            WeekAlignment::RangeStart => start,
            WeekAlignment::Monday => monday_of(start),
        };
        let Some(natural_end) = anchor.checked_add_days(Days::new(6)) else {
            buckets.push(WeekBucket {
                start,
                end: range.end(),
            });
            break;
        };

        let end = natural_end.min(range.end());
        buckets.push(WeekBucket { start, end });

        match natural_end.succ_opt() {
            Some(next) => start = next,
            None => break,
        }
    }

    buckets
}
