use crate::model::DateRange;
use chrono::{DateTime, Days, Duration, FixedOffset, NaiveTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitError {
    /// `start` is after `end`.
    Reversed(DateRange),
    ZeroSpan,
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitError::Reversed(range) => write!(f, "date range {range} starts after it ends"),
            SplitError::ZeroSpan => write!(f, "max_days must be greater than 0"),
        }
    }
}

impl std::error::Error for SplitError {}

/// Splits backfill windows into sub-ranges no longer than `max_days`, cutting
/// on tenant-local midnights.
#[derive(Debug, Clone, Copy)]
pub struct DateRangeSplitter {
    max_days: u32,
}

impl DateRangeSplitter {
    pub fn new(max_days: u32) -> Result<Self, SplitError> {
        if max_days == 0 {
            return Err(SplitError::ZeroSpan);
        }
        Ok(Self { max_days })
    }

    pub fn max_days(&self) -> u32 {
        self.max_days
    }

    /// Returns contiguous, non-overlapping closed sub-ranges covering exactly
    /// `range`. Each inner piece ends one nanosecond before the next begins,
    /// so an instant on a cut belongs to the later piece only. A zero-length
    /// range yields one zero-length range.
    pub fn split(
        &self,
        range: DateRange,
        offset: FixedOffset,
    ) -> Result<Vec<DateRange>, SplitError> {
        if !range.is_ordered() {
            return Err(SplitError::Reversed(range));
        }

        let mut pieces = Vec::new();
        let mut cursor = range.start;

        loop {
            match self.next_boundary(cursor, offset) {
                Some(boundary) if boundary < range.end => {
                    pieces.push(DateRange::new(cursor, boundary - Duration::nanoseconds(1)));
                    cursor = boundary;
                }
                _ => {
                    pieces.push(DateRange::new(cursor, range.end));
                    return Ok(pieces);
                }
            }
        }
    }

    /// Tenant-local midnight `max_days` calendar days after `cursor`'s local date.
    fn next_boundary(&self, cursor: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
        let local_date = cursor.with_timezone(&offset).date_naive();
        let boundary_date = local_date.checked_add_days(Days::new(u64::from(self.max_days)))?;
        boundary_date
            .and_time(NaiveTime::MIN)
            .and_local_timezone(offset)
            .single()
            .map(|local| local.with_timezone(&Utc))
    }
}
