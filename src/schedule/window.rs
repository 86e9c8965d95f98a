use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Daily local-time window during which a tenant's scheduled job may run.
///
/// `start_time > end_time` describes a window that opens in the evening and
/// closes the following morning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl AvailabilityWindow {
    pub fn new(start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            start_time,
            end_time,
        }
    }

    pub fn spans_midnight(&self) -> bool {
        self.start_time > self.end_time
    }

    /// Concrete `[open, close]` instants of the occurrence relevant to `local`.
    ///
    /// For a midnight-spanning window the occurrence that opened yesterday is
    /// selected while the local time of day is still before `end_time`.
    pub fn occurrence(
        &self,
        local: DateTime<FixedOffset>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let offset = *local.offset();
        let today = local.date_naive();

        let (open_date, close_date) = if !self.spans_midnight() {
            (today, today)
        } else if local.time() <= self.end_time {
            (today - Duration::days(1), today)
        } else {
            (today, today + Duration::days(1))
        };

        let open = at(offset, open_date, self.start_time)?;
        let close = at(offset, close_date, self.end_time)?;
        Some((open, close))
    }
}

impl fmt::Display for AvailabilityWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

fn at(offset: FixedOffset, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|instant| instant.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    OutsideWindow,
    InsideNotYetRun,
    InsideAlreadyRun,
}

impl WindowState {
    pub fn should_run(&self) -> bool {
        matches!(self, WindowState::InsideNotYetRun)
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowState::OutsideWindow => write!(f, "outside-window"),
            WindowState::InsideNotYetRun => write!(f, "inside-window-not-yet-run"),
            WindowState::InsideAlreadyRun => write!(f, "inside-window-already-run"),
        }
    }
}

/// Computes the scheduling state from scratch; nothing but `last_run` is persisted.
///
/// A missing window is always open. A marker later than `now` counts as a run
/// that already happened.
pub fn evaluate(
    now: DateTime<Utc>,
    offset: FixedOffset,
    window: Option<&AvailabilityWindow>,
    last_run: Option<DateTime<Utc>>,
) -> WindowState {
    if matches!(last_run, Some(marker) if marker > now) {
        return WindowState::InsideAlreadyRun;
    }

    let Some(window) = window else {
        return WindowState::InsideNotYetRun;
    };

    let Some((open, close)) = window.occurrence(now.with_timezone(&offset)) else {
        return WindowState::OutsideWindow;
    };

    if now < open || now > close {
        return WindowState::OutsideWindow;
    }

    match last_run {
        Some(marker) if marker >= open && marker <= close => WindowState::InsideAlreadyRun,
        _ => WindowState::InsideNotYetRun,
    }
}
