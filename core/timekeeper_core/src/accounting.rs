//! Elapsed-time accounting over local calendar windows.
//!
//! All boundaries are computed in a fixed offset handed in by the caller; nothing here consults
//! the system timezone. Windows are half-open: `[start, end)`.

use anyhow::{anyhow, Result};
use serde::Serialize;
use time::{Date, Duration, Month, OffsetDateTime, Time, UtcOffset};

use crate::model::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Window {
    /// `[local midnight, next local midnight)` around `now`.
    pub fn today(now: OffsetDateTime, offset: UtcOffset) -> Result<Self> {
        Ok(Self {
            start: start_of_day(now, offset),
            end: next_day(now, offset)?,
        })
    }

    /// Seven calendar days ending with today.
    pub fn trailing_week(now: OffsetDateTime, offset: UtcOffset) -> Result<Self> {
        let today = start_of_day(now, offset);
        Ok(Self {
            start: today
                .checked_sub(Duration::days(6))
                .ok_or_else(|| anyhow!("no week before {today}"))?,
            end: next_day(now, offset)?,
        })
    }

    pub fn month(now: OffsetDateTime, offset: UtcOffset) -> Result<Self> {
        month_bounds(now, offset)
    }

    pub fn year(now: OffsetDateTime, offset: UtcOffset) -> Result<Self> {
        year_bounds(now, offset)
    }

    pub fn clip_ms(&self, start: OffsetDateTime, end: OffsetDateTime) -> i64 {
        clip_overlap_ms(start, end, self.start, self.end)
    }
}

/// Length of the intersection of `[a_start, a_end)` and `[b_start, b_end)` in whole
/// milliseconds, truncated. Disjoint or merely touching intervals give 0.
pub fn clip_overlap_ms(
    a_start: OffsetDateTime,
    a_end: OffsetDateTime,
    b_start: OffsetDateTime,
    b_end: OffsetDateTime,
) -> i64 {
    let start = a_start.max(b_start);
    let end = a_end.min(b_end);
    if end <= start {
        return 0;
    }
    i64::try_from((end - start).whole_milliseconds()).unwrap_or(i64::MAX)
}

/// Sum of every closed session clipped to `window`, plus the open interval
/// `[current_start, now)` when the timer is running.
pub fn total_ms_in_window(
    sessions: &[Session],
    window: Window,
    running: bool,
    current_start: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> i64 {
    let closed: i64 = sessions
        .iter()
        .filter_map(|s| s.stop.map(|stop| window.clip_ms(s.start, stop)))
        .sum();

    let open = match (running, current_start) {
        (true, Some(start)) => window.clip_ms(start, now),
        _ => 0,
    };

    closed.saturating_add(open)
}

pub fn start_of_day(t: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    t.to_offset(offset).replace_time(Time::MIDNIGHT)
}

/// Fails only past the last representable date.
pub fn next_day(t: OffsetDateTime, offset: UtcOffset) -> Result<OffsetDateTime> {
    let day = start_of_day(t, offset);
    day.checked_add(Duration::days(1))
        .ok_or_else(|| anyhow!("no day after {day}"))
}

pub fn month_bounds(t: OffsetDateTime, offset: UtcOffset) -> Result<Window> {
    let local = t.to_offset(offset);
    let start = Date::from_calendar_date(local.year(), local.month(), 1)?;
    let end = match local.month() {
        Month::December => Date::from_calendar_date(local.year() + 1, Month::January, 1)?,
        month => Date::from_calendar_date(local.year(), month.next(), 1)?,
    };
    Ok(Window {
        start: start.midnight().assume_offset(offset),
        end: end.midnight().assume_offset(offset),
    })
}

pub fn year_bounds(t: OffsetDateTime, offset: UtcOffset) -> Result<Window> {
    let local = t.to_offset(offset);
    let start = Date::from_calendar_date(local.year(), Month::January, 1)?;
    let end = Date::from_calendar_date(local.year() + 1, Month::January, 1)?;
    Ok(Window {
        start: start.midnight().assume_offset(offset),
        end: end.midnight().assume_offset(offset),
    })
}

/// Totals for the four reporting windows, each computed independently against the same `now`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowTotals {
    pub today_ms: i64,
    pub week_ms: i64,
    pub month_ms: i64,
    pub year_ms: i64,
}

impl WindowTotals {
    pub fn compute(
        sessions: &[Session],
        running: bool,
        current_start: Option<OffsetDateTime>,
        now: OffsetDateTime,
        offset: UtcOffset,
    ) -> Result<Self> {
        let total = |w: Window| total_ms_in_window(sessions, w, running, current_start, now);
        Ok(Self {
            today_ms: total(Window::today(now, offset)?),
            week_ms: total(Window::trailing_week(now, offset)?),
            month_ms: total(Window::month(now, offset)?),
            year_ms: total(Window::year(now, offset)?),
        })
    }
}

/// Whole hours, minutes and seconds. Hours are not wrapped into days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Breakdown {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Breakdown {
    pub fn from_ms(ms: i64) -> Self {
        let total_seconds = ms.max(0) / 1000;
        Self {
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
            seconds: total_seconds % 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BreakdownText {
    pub hours: String,
    pub minutes: String,
    pub seconds: String,
}

impl From<Breakdown> for BreakdownText {
    fn from(b: Breakdown) -> Self {
        Self {
            hours: format!("{} hrs", b.hours),
            minutes: format!("{} min", b.minutes),
            seconds: format!("{} sec", b.seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{datetime, offset};

    use super::*;

    const IST: UtcOffset = offset!(+5:30);

    fn closed(start: OffsetDateTime, stop: OffsetDateTime) -> Session {
        Session {
            start,
            stop: Some(stop),
            duration_ms: i64::try_from((stop - start).whole_milliseconds()).unwrap(),
        }
    }

    #[test]
    fn clip_overlap_is_symmetric_and_never_negative() {
        let a = datetime!(2024-06-01 10:00 +5:30);
        let b = datetime!(2024-06-01 11:00 +5:30);
        let c = datetime!(2024-06-01 10:30 +5:30);
        let d = datetime!(2024-06-01 12:00 +5:30);

        assert_eq!(clip_overlap_ms(a, b, c, d), 30 * 60 * 1000);
        assert_eq!(clip_overlap_ms(c, d, a, b), 30 * 60 * 1000);

        // Disjoint.
        assert_eq!(clip_overlap_ms(a, c, b, d), 0);
        assert_eq!(clip_overlap_ms(b, d, a, c), 0);
        // Touching at an endpoint.
        assert_eq!(clip_overlap_ms(a, c, c, d), 0);
        // Inverted interval.
        assert_eq!(clip_overlap_ms(b, a, a, d), 0);
    }

    #[test]
    fn clip_overlap_contained_interval() {
        let outer = Window::today(datetime!(2024-06-01 12:00 +5:30), IST).unwrap();
        let start = datetime!(2024-06-01 09:15 +5:30);
        let stop = datetime!(2024-06-01 09:45 +5:30);
        assert_eq!(outer.clip_ms(start, stop), 30 * 60 * 1000);
    }

    #[test]
    fn clip_overlap_truncates_sub_millisecond_remainders() {
        let a = datetime!(2024-06-01 10:00 +5:30);
        let b = a + Duration::nanoseconds(1_999_999);
        assert_eq!(clip_overlap_ms(a, b, a, b), 1);
    }

    #[test]
    fn start_of_day_uses_the_given_offset() {
        // 20:00 UTC on May 31 is already 01:30 on June 1 in UTC+5:30.
        let t = datetime!(2024-05-31 20:00 UTC);
        assert_eq!(start_of_day(t, IST), datetime!(2024-06-01 00:00 +5:30));
        assert_eq!(next_day(t, IST).unwrap(), datetime!(2024-06-02 00:00 +5:30));
        assert_eq!(start_of_day(t, UtcOffset::UTC), datetime!(2024-05-31 00:00 UTC));
    }

    #[test]
    fn month_bounds_roll_over_december() {
        let w = month_bounds(datetime!(2024-12-15 08:00 +5:30), IST).unwrap();
        assert_eq!(w.start, datetime!(2024-12-01 00:00 +5:30));
        assert_eq!(w.end, datetime!(2025-01-01 00:00 +5:30));

        let w = month_bounds(datetime!(2024-02-29 23:59 +5:30), IST).unwrap();
        assert_eq!(w.start, datetime!(2024-02-01 00:00 +5:30));
        assert_eq!(w.end, datetime!(2024-03-01 00:00 +5:30));
    }

    #[test]
    fn year_bounds_follow_local_year() {
        // Still 2024 in UTC, already 2025 locally.
        let w = year_bounds(datetime!(2024-12-31 19:00 UTC), IST).unwrap();
        assert_eq!(w.start, datetime!(2025-01-01 00:00 +5:30));
        assert_eq!(w.end, datetime!(2026-01-01 00:00 +5:30));
    }

    #[test]
    fn trailing_week_covers_seven_calendar_days() {
        let w = Window::trailing_week(datetime!(2024-06-07 15:00 +5:30), IST).unwrap();
        assert_eq!(w.start, datetime!(2024-06-01 00:00 +5:30));
        assert_eq!(w.end, datetime!(2024-06-08 00:00 +5:30));
        assert_eq!(w.end - w.start, Duration::days(7));
    }

    #[test]
    fn sessions_inside_window_sum_to_their_durations() {
        let sessions = vec![
            closed(datetime!(2024-06-01 08:00 +5:30), datetime!(2024-06-01 08:20 +5:30)),
            closed(datetime!(2024-06-01 09:00 +5:30), datetime!(2024-06-01 09:00:07.5 +5:30)),
            closed(datetime!(2024-06-01 13:00 +5:30), datetime!(2024-06-01 15:00 +5:30)),
        ];
        let now = datetime!(2024-06-01 18:00 +5:30);
        let window = Window::today(now, IST).unwrap();

        let expected: i64 = sessions.iter().map(|s| s.duration_ms).sum();
        assert_eq!(total_ms_in_window(&sessions, window, false, None, now), expected);
    }

    #[test]
    fn running_interval_is_added_once() {
        let sessions = vec![closed(
            datetime!(2024-06-01 08:00 +5:30),
            datetime!(2024-06-01 09:00 +5:30),
        )];
        let now = datetime!(2024-06-01 10:15 +5:30);
        let current_start = datetime!(2024-06-01 10:00 +5:30);
        let window = Window::today(now, IST).unwrap();

        let closed_only = total_ms_in_window(&sessions, window, false, None, now);
        let with_running = total_ms_in_window(&sessions, window, true, Some(current_start), now);
        assert_eq!(
            with_running,
            closed_only + clip_overlap_ms(current_start, now, window.start, window.end)
        );
        assert_eq!(with_running, 75 * 60 * 1000);

        // running without a start contributes nothing
        assert_eq!(total_ms_in_window(&sessions, window, true, None, now), closed_only);
    }

    #[test]
    fn open_sessions_are_skipped() {
        let sessions = vec![Session {
            start: datetime!(2024-06-01 08:00 +5:30),
            stop: None,
            duration_ms: 0,
        }];
        let now = datetime!(2024-06-01 10:00 +5:30);
        assert_eq!(
            total_ms_in_window(&sessions, Window::today(now, IST).unwrap(), false, None, now),
            0
        );
    }

    #[test]
    fn midnight_spanning_session_is_clipped_per_day() {
        let sessions = vec![closed(
            datetime!(2024-05-31 23:50 +5:30),
            datetime!(2024-06-01 00:10 +5:30),
        )];

        let may_31 = datetime!(2024-05-31 23:59 +5:30);
        let june_1 = datetime!(2024-06-01 12:00 +5:30);

        let may = total_ms_in_window(&sessions, Window::today(may_31, IST).unwrap(), false, None, may_31);
        let june = total_ms_in_window(&sessions, Window::today(june_1, IST).unwrap(), false, None, june_1);

        assert_eq!(Breakdown::from_ms(may).minutes, 10);
        assert_eq!(Breakdown::from_ms(june).minutes, 10);
        assert_eq!(may + june, sessions[0].duration_ms);
    }

    #[test]
    fn window_totals_nest() {
        let sessions = vec![
            // last year
            closed(datetime!(2023-12-31 22:00 +5:30), datetime!(2023-12-31 23:00 +5:30)),
            // earlier this year
            closed(datetime!(2024-02-10 10:00 +5:30), datetime!(2024-02-10 12:00 +5:30)),
            // earlier this month, outside the week
            closed(datetime!(2024-06-02 10:00 +5:30), datetime!(2024-06-02 10:30 +5:30)),
            // this week
            closed(datetime!(2024-06-18 10:00 +5:30), datetime!(2024-06-18 10:10 +5:30)),
            // today
            closed(datetime!(2024-06-20 09:00 +5:30), datetime!(2024-06-20 09:05 +5:30)),
        ];
        let now = datetime!(2024-06-20 10:00 +5:30);
        let current_start = datetime!(2024-06-20 09:59 +5:30);

        let totals = WindowTotals::compute(&sessions, true, Some(current_start), now, IST).unwrap();
        assert_eq!(totals.today_ms, 6 * 60 * 1000);
        assert_eq!(totals.week_ms, 16 * 60 * 1000);
        assert_eq!(totals.month_ms, 46 * 60 * 1000);
        assert_eq!(totals.year_ms, 166 * 60 * 1000);
    }

    #[test]
    fn windows_at_calendar_limits_are_errors_not_panics() {
        let last = Date::MAX.midnight().assume_utc() + Duration::hours(12);
        assert!(next_day(last, UtcOffset::UTC).is_err());
        assert!(Window::today(last, UtcOffset::UTC).is_err());
        assert!(month_bounds(last, UtcOffset::UTC).is_err());
        assert!(year_bounds(last, UtcOffset::UTC).is_err());

        let first = Date::MIN.midnight().assume_utc() + Duration::hours(12);
        assert!(Window::trailing_week(first, UtcOffset::UTC).is_err());
        assert!(Window::today(first, UtcOffset::UTC).is_ok());

        assert!(WindowTotals::compute(&[], false, None, last, UtcOffset::UTC).is_err());
    }

    #[test]
    fn breakdown_truncates_and_does_not_wrap_hours() {
        assert_eq!(
            Breakdown::from_ms(59_999),
            Breakdown { hours: 0, minutes: 0, seconds: 59 }
        );
        assert_eq!(
            Breakdown::from_ms(((30 * 3600) + (5 * 60) + 9) * 1000 + 999),
            Breakdown { hours: 30, minutes: 5, seconds: 9 }
        );
        assert_eq!(Breakdown::from_ms(-5), Breakdown { hours: 0, minutes: 0, seconds: 0 });

        let text = BreakdownText::from(Breakdown::from_ms(1_800_000));
        assert_eq!(text.hours, "0 hrs");
        assert_eq!(text.minutes, "30 min");
        assert_eq!(text.seconds, "0 sec");
    }
}
