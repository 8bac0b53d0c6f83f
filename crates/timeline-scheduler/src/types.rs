use chrono::NaiveTime;

/// Defines when and how often a timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fire repeatedly, `every_secs` after the previous firing.
    Interval { every_secs: u64 },

    /// Fire every day at the given local wall-clock time.
    Daily { at: NaiveTime },
}

impl Schedule {
    pub fn every_minutes(minutes: u64) -> Self {
        Schedule::Interval {
            every_secs: minutes.saturating_mul(60),
        }
    }
}

/// Handle returned by [`Scheduler::add`](crate::timers::Scheduler::add).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}
