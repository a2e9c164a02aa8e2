// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tick::Clock;

type NowFn = dyn Fn() -> SystemTime + Send + Sync;

/// Provides the current wall-clock time used for alignment.
///
/// The ticker reads the time source whenever it needs to know where "now" falls relative
/// to the aligned boundaries, and to stamp the firings it delivers. By default this is the
/// system clock. Hosts that already share a [`tick::Clock`] pass it in with
/// [`TimeSource::from_clock`], which also lets tests steer the wall clock through
/// `tick::ClockControl`. Anything else can supply a closure.
///
/// Cloning a time source is inexpensive and every clone reads the same underlying function.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use metronome::TimeSource;
///
/// let fixed = SystemTime::UNIX_EPOCH + Duration::from_secs(3600);
/// let source = TimeSource::from_fn(move || fixed);
///
/// assert_eq!(source.now(), fixed);
/// ```
#[derive(Clone)]
pub struct TimeSource(Source);

#[derive(Clone)]
enum Source {
    System,
    Clock(Clock),
    Custom(Arc<NowFn>),
}

impl TimeSource {
    /// Creates a time source that reads [`SystemTime::now`].
    #[must_use]
    pub fn system() -> Self {
        Self(Source::System)
    }

    /// Creates a time source that reads [`Clock::system_time`].
    #[must_use]
    pub fn from_clock(clock: Clock) -> Self {
        Self(Source::Clock(clock))
    }

    /// Creates a time source backed by a custom function.
    #[must_use]
    pub fn from_fn<F>(now: F) -> Self
    where
        F: Fn() -> SystemTime + Send + Sync + 'static,
    {
        Self(Source::Custom(Arc::new(now)))
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> SystemTime {
        match &self.0 {
            Source::System => SystemTime::now(),
            Source::Clock(clock) => clock.system_time(),
            Source::Custom(now) => now(),
        }
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::system()
    }
}

impl From<Clock> for TimeSource {
    fn from(clock: Clock) -> Self {
        Self::from_clock(clock)
    }
}

impl fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Source::System => f.write_str("TimeSource::System"),
            Source::Clock(_) => f.write_str("TimeSource::Clock"),
            Source::Custom(_) => f.write_str("TimeSource::Custom"),
        }
    }
}
