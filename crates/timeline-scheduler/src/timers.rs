use chrono::{DateTime, Local};
use tracing::debug;

use crate::{
    schedule::compute_next_run,
    types::{Schedule, TimerId},
};

/// A registered timer carrying an opaque payload that is handed back when due.
#[derive(Debug, Clone)]
struct Timer<T> {
    id: TimerId,
    schedule: Schedule,
    next_run: DateTime<Local>,
    run_count: u32,
    /// If set, the timer is dropped after this many firings.
    max_runs: Option<u32>,
    payload: T,
}

/// In-memory timer set, polled by its owner.
///
/// The scheduler never runs callbacks itself: [`Scheduler::run_pending`]
/// returns the payloads of every due timer and the caller dispatches them.
/// Resolution is therefore bounded by how often the owner polls.
#[derive(Debug)]
pub struct Scheduler<T> {
    timers: Vec<Timer<T>>,
    next_id: u64,
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a timer. Returns `None` if the schedule has no representable
    /// firing after `now`.
    pub fn add(
        &mut self,
        schedule: Schedule,
        payload: T,
        max_runs: Option<u32>,
        now: DateTime<Local>,
    ) -> Option<TimerId> {
        let next_run = compute_next_run(&schedule, now)?;
        let id = TimerId(self.next_id);
        self.next_id += 1;

        debug!(timer = %id, next_run = %next_run.format("%Y-%m-%d %H:%M:%S"), "timer registered");
        self.timers.push(Timer {
            id,
            schedule,
            next_run,
            run_count: 0,
            max_runs,
            payload,
        });
        Some(id)
    }

    /// Remove a timer. Returns `false` if it was already gone.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() < before
    }

    /// Drop every timer.
    pub fn clear(&mut self) {
        if !self.timers.is_empty() {
            debug!(count = self.timers.len(), "clearing timers");
        }
        self.timers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest upcoming firing across all timers.
    pub fn next_run(&self) -> Option<DateTime<Local>> {
        self.timers.iter().map(|t| t.next_run).min()
    }

    /// Collect the payloads of all timers due at `now`, earliest first.
    ///
    /// Each due timer fires once per call, however many periods were missed,
    /// and is rescheduled relative to `now`. Exhausted timers are removed.
    pub fn run_pending(&mut self, now: DateTime<Local>) -> Vec<T> {
        let mut due: Vec<(DateTime<Local>, T)> = Vec::new();

        self.timers.retain_mut(|timer| {
            if timer.next_run > now {
                return true;
            }
            due.push((timer.next_run, timer.payload.clone()));
            timer.run_count += 1;

            // next is None once max_runs is reached or the calendar runs out.
            let next = if timer.max_runs.is_some_and(|m| timer.run_count >= m) {
                None
            } else {
                compute_next_run(&timer.schedule, now)
            };
            match next {
                Some(next_run) => {
                    timer.next_run = next_run;
                    true
                }
                None => {
                    debug!(timer = %timer.id, runs = timer.run_count, "timer exhausted");
                    false
                }
            }
        });

        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, payload)| payload).collect()
    }
}

impl<T: Clone> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime, TimeZone};

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 1, 14, 10, 0, 0).earliest().unwrap()
    }

    #[test]
    fn interval_timer_fires_once_per_period() {
        let mut s = Scheduler::new();
        s.add(Schedule::every_minutes(10), "tick", None, t0()).unwrap();

        assert!(s.run_pending(t0() + Duration::minutes(9)).is_empty());
        assert_eq!(s.run_pending(t0() + Duration::minutes(10)), vec!["tick"]);
        assert!(s.run_pending(t0() + Duration::minutes(15)).is_empty());
        assert_eq!(s.run_pending(t0() + Duration::minutes(20)), vec!["tick"]);
        assert_eq!(s.next_run(), Some(t0() + Duration::minutes(30)));
    }

    #[test]
    fn late_poll_fires_once_and_rebases_on_dispatch_time() {
        let mut s = Scheduler::new();
        s.add(Schedule::every_minutes(10), 1u8, None, t0()).unwrap();

        let late = t0() + Duration::minutes(35);
        assert_eq!(s.run_pending(late), vec![1]);
        assert_eq!(s.next_run(), Some(late + Duration::minutes(10)));
    }

    #[test]
    fn max_runs_makes_a_daily_timer_single_shot() {
        let mut s = Scheduler::new();
        let schedule = Schedule::Daily {
            at: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        };
        s.add(schedule, "start", Some(1), t0()).unwrap();

        assert!(s.run_pending(t0() + Duration::hours(1)).is_empty());
        assert_eq!(s.run_pending(t0() + Duration::hours(2)), vec!["start"]);
        assert!(s.is_empty());
        assert!(s.run_pending(t0() + Duration::days(1)).is_empty());
    }

    #[test]
    fn cancel_and_clear() {
        let mut s = Scheduler::new();
        let a = s.add(Schedule::every_minutes(1), 'a', None, t0()).unwrap();
        s.add(Schedule::every_minutes(1), 'b', None, t0()).unwrap();

        assert!(s.cancel(a));
        assert!(!s.cancel(a));
        assert_eq!(s.run_pending(t0() + Duration::minutes(1)), vec!['b']);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.next_run(), None);
    }

    #[test]
    fn due_payloads_come_back_earliest_first() {
        let mut s = Scheduler::new();
        s.add(Schedule::every_minutes(5), "slow", None, t0()).unwrap();
        s.add(Schedule::every_minutes(3), "fast", None, t0()).unwrap();

        assert_eq!(
            s.run_pending(t0() + Duration::minutes(6)),
            vec!["fast", "slow"]
        );
    }

    #[test]
    fn unrepresentable_interval_is_not_registered() {
        let mut s: Scheduler<()> = Scheduler::new();
        assert!(s
            .add(Schedule::every_minutes(i64::MAX as u64), (), None, t0())
            .is_none());
        assert!(s.is_empty());
        assert!(s.run_pending(t0() + Duration::seconds(1)).is_empty());
    }
}
