//! `timeline-scheduler`: drives a server through its variant timeline.
//!
//! # Overview
//!
//! The [`updater::Updater`] owns an explicit [`timers::Scheduler`] that is
//! polled by [`updater::Updater::run`]. Due timers never do real work: they
//! only push update jobs onto the single-worker [`queue::UpdateQueue`],
//! which applies the next variant to every update target in order and
//! records progress through the [`progress::ProgressStore`].
//!
//! # Timers
//!
//! | Schedule   | Used for                                              |
//! |------------|-------------------------------------------------------|
//! | `Daily`    | The start trigger (`max_runs = 1`)                    |
//! | `Interval` | One update every `interval` minutes after the start   |

pub mod error;
pub mod progress;
pub mod queue;
pub mod schedule;
pub mod timers;
pub mod types;
pub mod updater;

pub use error::{Result, SchedulerError};
pub use progress::ProgressStore;
pub use queue::UpdateQueue;
pub use timers::Scheduler;
pub use types::{Schedule, TimerId};
pub use updater::{Updater, UpdaterSettings, UpdaterState};
