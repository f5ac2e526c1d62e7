use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crewplan_core::{DomainError, DomainResult};

/// A date range with an optional open end.
///
/// `end = None` means open-ended: the range extends indefinitely past its
/// start. Endpoints are calendar dates (no time-of-day component).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Build a range, rejecting `end < start`.
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> DomainResult<Self> {
        if let Some(end) = end {
            if end < start {
                return Err(DomainError::validation(format!(
                    "end date {end} precedes start date {start}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Closed range between two dates.
    pub fn closed(start: NaiveDate, end: NaiveDate) -> DomainResult<Self> {
        Self::new(start, Some(end))
    }

    /// Open-ended range from a start date.
    pub fn open(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    /// Strict overlap: `a.start < b.end && a.end > b.start`.
    ///
    /// Touching ranges (one ends the day before the other starts, or both
    /// share a single boundary day) do not overlap. An open end behaves as a
    /// date infinitely far in the future.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        let starts_before_other_ends = match other.end {
            Some(end) => self.start < end,
            None => true,
        };
        let ends_after_other_starts = match self.end {
            Some(end) => end > other.start,
            None => true,
        };
        starts_before_other_ends && ends_after_other_starts
    }

}

impl core::fmt::Display for DateRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.end {
            Some(end) => write!(f, "{} to {}", self.start, end),
            None => write!(f, "{} (open-ended)", self.start),
        }
    }
}
