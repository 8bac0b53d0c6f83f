use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};

use crate::types::Schedule;

/// Compute the next local execution time for `schedule` starting *after* `from`.
///
/// Returns `None` when no representable instant follows `from` (an interval
/// too large for the calendar).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Local>) -> Option<DateTime<Local>> {
    match schedule {
        Schedule::Interval { every_secs } => {
            let step = Duration::try_seconds(i64::try_from(*every_secs).ok()?)?;
            from.checked_add_signed(step)
        }

        Schedule::Daily { at } => {
            let today = from.date_naive();
            match local_at(today, *at) {
                Some(candidate) if candidate > from => Some(candidate),
                // Today's window has passed or fell into a DST gap: use tomorrow.
                _ => local_at(today.succ_opt()?, *at),
            }
        }
    }
}

/// `date` at `time` in local time; the earlier instant when ambiguous.
fn local_at(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&date.and_time(time)).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 14, h, m, 0).earliest().unwrap()
    }

    #[test]
    fn interval_is_measured_from_the_given_instant() {
        let from = at(10, 0);
        let next = compute_next_run(&Schedule::every_minutes(90), from).unwrap();
        assert_eq!(next, at(11, 30));
    }

    #[test]
    fn daily_fires_later_today_when_time_is_ahead() {
        let schedule = Schedule::Daily {
            at: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        };
        assert_eq!(compute_next_run(&schedule, at(9, 0)).unwrap(), at(18, 0));
    }

    #[test]
    fn daily_rolls_over_to_tomorrow_when_time_has_passed() {
        let schedule = Schedule::Daily {
            at: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        };
        let next = compute_next_run(&schedule, at(9, 0)).unwrap();
        assert_eq!(
            next,
            Local.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).earliest().unwrap()
        );
        // exactly now is not "after now"
        let next = compute_next_run(&schedule, at(8, 0)).unwrap();
        assert_eq!(next.date_naive(), at(8, 0).date_naive().succ_opt().unwrap());
    }

    #[test]
    fn oversized_interval_never_fires() {
        // saturates to u64::MAX seconds, which no i64 offset can hold
        assert_eq!(
            compute_next_run(&Schedule::every_minutes(i64::MAX as u64), at(10, 0)),
            None
        );
        // fits a time delta but lands past the last representable date
        assert_eq!(
            compute_next_run(&Schedule::every_minutes(200_000_000_000), at(10, 0)),
            None
        );
    }
}
