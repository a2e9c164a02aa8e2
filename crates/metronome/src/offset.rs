// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// A fixed phase shift applied before aligning firings to wall-clock boundaries.
///
/// The offset is expressed in whole seconds, minutes and hours. The fields are signed and
/// are collapsed into a single signed duration by [`Offset::as_nanos`]. With an interval of
/// one minute and an offset of five seconds, aligned firings land on `hh:mm:05`.
///
/// # Examples
///
/// ```
/// use metronome::Offset;
///
/// let offset = Offset::new(5, 1, 0);
///
/// assert_eq!(offset.as_nanos(), 65_000_000_000);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Offset {
    seconds: i64,
    minutes: i64,
    hours: i64,
}

impl Offset {
    /// An offset that does not shift anything.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates an offset from its seconds, minutes and hours parts.
    #[must_use]
    pub const fn new(seconds: i64, minutes: i64, hours: i64) -> Self {
        Self { seconds, minutes, hours }
    }

    /// Returns the seconds part.
    #[must_use]
    pub const fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Returns the minutes part.
    #[must_use]
    pub const fn minutes(&self) -> i64 {
        self.minutes
    }

    /// Returns the hours part.
    #[must_use]
    pub const fn hours(&self) -> i64 {
        self.hours
    }

    /// Returns the total shift in nanoseconds. Negative offsets shift backwards.
    #[must_use]
    pub const fn as_nanos(&self) -> i128 {
        let seconds = self.seconds as i128 + self.minutes as i128 * 60 + self.hours as i128 * 3600;
        seconds * NANOS_PER_SECOND
    }

    /// Returns `true` when the total shift is strictly shorter than `interval`.
    ///
    /// A negative offset is always shorter than any interval.
    #[must_use]
    pub fn is_less_than(&self, interval: Duration) -> bool {
        // `as_nanos` of a `Duration` always fits into `i128`.
        self.as_nanos() < interval.as_nanos().cast_signed()
    }
}
