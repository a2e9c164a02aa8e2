// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::{DispatchPolicy, Offset, Task, TimeSource};

/// The interval used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Plain-data settings of an [`AlignedTicker`][crate::AlignedTicker].
///
/// Unlike [`TriggerOptions`], the settings carry the interval exactly as given, so a zero
/// interval reaches the ticker and is rejected there.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use metronome::{Offset, TickerSettings};
///
/// // Every 5 minutes, 10 seconds past the boundary.
/// let settings = TickerSettings::new(Duration::from_secs(300))
///     .with_correction(true)
///     .with_offset(Offset::new(10, 0, 0));
///
/// assert!(settings.correction());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TickerSettings {
    interval: Duration,
    correction: bool,
    first_trigger: bool,
    offset: Offset,
}

impl TickerSettings {
    /// Creates settings for `interval` with correction and the first firing disabled.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            correction: false,
            first_trigger: false,
            offset: Offset::ZERO,
        }
    }

    /// Enables or disables wall-clock alignment and drift correction.
    #[must_use]
    pub const fn with_correction(mut self, correction: bool) -> Self {
        self.correction = correction;
        self
    }

    /// Enables or disables an immediate firing when the ticker is created.
    #[must_use]
    pub const fn with_first_trigger(mut self, first_trigger: bool) -> Self {
        self.first_trigger = first_trigger;
        self
    }

    /// Sets the phase shift applied before alignment.
    #[must_use]
    pub const fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    /// Returns the interval as configured.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns whether correction is enabled.
    #[must_use]
    pub const fn correction(&self) -> bool {
        self.correction
    }

    /// Returns whether the ticker fires once immediately on creation.
    #[must_use]
    pub const fn first_trigger(&self) -> bool {
        self.first_trigger
    }

    /// Returns the phase shift.
    #[must_use]
    pub const fn offset(&self) -> Offset {
        self.offset
    }
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// Configuration of a [`Scheduler`][crate::Scheduler].
///
/// A passive holder of values: the interval, correction and first-trigger flags, the offset,
/// the task, the time source, and how firings are dispatched to the task. Unset values fall
/// back to their defaults in the getters.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use metronome::{DispatchPolicy, Task, TriggerOptions};
///
/// let options = TriggerOptions::new(Task::from_fn(|| println!("flush")))
///     .with_interval(Duration::from_secs(60))
///     .with_correction(true)
///     .with_offset(5, 0, 0)
///     .with_dispatch_policy(DispatchPolicy::SkipWhileRunning);
///
/// assert_eq!(options.interval(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TriggerOptions {
    interval: Duration,
    correction: bool,
    first_trigger: bool,
    offset: Offset,
    task: Option<Task>,
    time_source: Option<TimeSource>,
    dispatch_policy: DispatchPolicy,
    max_concurrent_tasks: Option<NonZeroUsize>,
}

impl TriggerOptions {
    /// Creates options that run `task`, with every other value at its default.
    #[must_use]
    pub fn new(task: Task) -> Self {
        Self {
            task: Some(task),
            ..Self::default()
        }
    }

    /// Sets the firing interval. Zero means [`DEFAULT_INTERVAL`].
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enables or disables wall-clock alignment and drift correction.
    #[must_use]
    pub fn with_correction(mut self, correction: bool) -> Self {
        self.correction = correction;
        self
    }

    /// Enables or disables a firing as soon as the scheduler is created.
    #[must_use]
    pub fn with_first_trigger(mut self, first_trigger: bool) -> Self {
        self.first_trigger = first_trigger;
        self
    }

    /// Sets the phase shift from its seconds, minutes and hours parts.
    #[must_use]
    pub fn with_offset(mut self, seconds: i64, minutes: i64, hours: i64) -> Self {
        self.offset = Offset::new(seconds, minutes, hours);
        self
    }

    /// Replaces the task.
    #[must_use]
    pub fn with_task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }

    /// Replaces the source of the current wall-clock time.
    #[must_use]
    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Sets how firings are dispatched to the task.
    #[must_use]
    pub fn with_dispatch_policy(mut self, dispatch_policy: DispatchPolicy) -> Self {
        self.dispatch_policy = dispatch_policy;
        self
    }

    /// Caps the number of task runs in flight. Firings beyond the cap are skipped.
    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrent_tasks = Some(limit);
        self
    }

    /// Returns the firing interval, or [`DEFAULT_INTERVAL`] when unset or zero.
    #[must_use]
    pub fn interval(&self) -> Duration {
        if self.interval.is_zero() {
            return DEFAULT_INTERVAL;
        }

        self.interval
    }

    /// Returns whether correction is enabled.
    #[must_use]
    pub fn correction(&self) -> bool {
        self.correction
    }

    /// Returns whether the scheduler fires once as soon as it is created.
    #[must_use]
    pub fn first_trigger(&self) -> bool {
        self.first_trigger
    }

    /// Returns the phase shift.
    #[must_use]
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// Returns the task, if one was configured.
    #[must_use]
    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    /// Returns the time source, or the system clock when none was configured.
    #[must_use]
    pub fn time_source(&self) -> TimeSource {
        self.time_source.clone().unwrap_or_default()
    }

    /// Returns the dispatch policy.
    #[must_use]
    pub fn dispatch_policy(&self) -> DispatchPolicy {
        self.dispatch_policy
    }

    /// Returns the cap on task runs in flight, or `None` when unbounded.
    #[must_use]
    pub fn max_concurrent_tasks(&self) -> Option<NonZeroUsize> {
        self.max_concurrent_tasks
    }

    /// Returns the ticker settings described by these options.
    #[must_use]
    pub fn ticker_settings(&self) -> TickerSettings {
        TickerSettings::new(self.interval())
            .with_correction(self.correction)
            .with_first_trigger(self.first_trigger)
            .with_offset(self.offset)
    }
}
