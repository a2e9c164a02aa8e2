// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use crate::{Error, ErrorKind, Offset, Result};

/// The smallest interval a correcting ticker runs at. Shorter intervals are raised to it.
pub const MIN_CORRECTED_INTERVAL: Duration = Duration::from_millis(100);

/// Two delivered firings are kept at least this fraction of the effective interval apart.
const MIN_SPACING_COEFFICIENT: f64 = 0.5;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Magnitude class of an interval. Selects both the alignment quantum and the
/// correction threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    SubSecond,
    SubMinute,
    SubHour,
    Hours,
}

impl Granularity {
    fn of(interval: Duration) -> Self {
        if interval < Duration::from_secs(1) {
            Self::SubSecond
        } else if interval < Duration::from_secs(60) {
            Self::SubMinute
        } else if interval < Duration::from_secs(3600) {
            Self::SubHour
        } else {
            Self::Hours
        }
    }

    const fn quantum(self) -> Duration {
        match self {
            Self::SubSecond => MIN_CORRECTED_INTERVAL,
            Self::SubMinute => Duration::from_secs(1),
            Self::SubHour => Duration::from_secs(60),
            Self::Hours => Duration::from_secs(3600),
        }
    }

    const fn threshold(self) -> Duration {
        match self {
            Self::SubSecond => Duration::from_millis(10),
            Self::SubMinute => Duration::from_millis(100),
            Self::SubHour => Duration::from_secs(1),
            Self::Hours => Duration::from_secs(60),
        }
    }
}

/// Alignment values derived once from the configured interval.
///
/// - The *effective interval* drives the physical timer. With correction enabled it is never
///   shorter than [`MIN_CORRECTED_INTERVAL`].
/// - The *guide* is the alignment period: the effective interval rounded up to the next multiple
///   of a quantum (100ms, 1s, 1min or 1h depending on the interval's magnitude). Corrected firings
///   land on offset-shifted multiples of the guide.
/// - The *correction threshold* is the largest phase error tolerated without a correction wait.
///
/// The guide is never shorter than the effective interval, and the threshold is always shorter
/// than the guide.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use metronome::AlignmentParameters;
///
/// let parameters = AlignmentParameters::new(Duration::from_secs(90), true)?;
///
/// assert_eq!(parameters.guide(), Duration::from_secs(120));
/// assert_eq!(parameters.correction_threshold(), Duration::from_secs(1));
/// # Ok::<(), metronome::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentParameters {
    effective_interval: Duration,
    guide: Duration,
    correction_threshold: Duration,
}

impl AlignmentParameters {
    /// Derives the alignment values for `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ZeroInterval`] when `interval` is zero.
    pub fn new(interval: Duration, correction: bool) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::from_kind(ErrorKind::ZeroInterval));
        }

        let effective_interval = if correction {
            interval.max(MIN_CORRECTED_INTERVAL)
        } else {
            interval
        };

        let granularity = Granularity::of(effective_interval);
        let quantum = granularity.quantum().as_nanos();
        let rounded = effective_interval.as_nanos().div_ceil(quantum) * quantum;

        Ok(Self {
            effective_interval,
            // Rounding up can only overflow for intervals close to `Duration::MAX`.
            guide: duration_from_nanos(rounded).unwrap_or(Duration::MAX),
            correction_threshold: granularity.threshold(),
        })
    }

    /// Returns the interval that drives the physical timer.
    #[must_use]
    pub const fn effective_interval(&self) -> Duration {
        self.effective_interval
    }

    /// Returns the alignment period.
    #[must_use]
    pub const fn guide(&self) -> Duration {
        self.guide
    }

    /// Returns the largest phase error tolerated without a correction wait.
    #[must_use]
    pub const fn correction_threshold(&self) -> Duration {
        self.correction_threshold
    }

    /// Returns the minimum wall-clock spacing between two delivered firings of a
    /// correcting ticker.
    #[must_use]
    pub fn min_spacing(&self) -> Duration {
        self.correction_threshold
            .max(self.effective_interval.mul_f64(MIN_SPACING_COEFFICIENT))
    }

    /// Returns how far `now` is past the last offset-shifted guide boundary.
    ///
    /// The result is always in `[0, guide)`, including for instants before the Unix epoch
    /// and for negative offsets.
    #[must_use]
    pub fn phase(&self, now: SystemTime, offset: Offset) -> Duration {
        let now = match now.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(since) => since.as_nanos().cast_signed(),
            Err(error) => -error.duration().as_nanos().cast_signed(),
        };

        let guide = self.guide.as_nanos().cast_signed();
        let phase = (now - offset.as_nanos()).rem_euclid(guide);

        // `rem_euclid` keeps the phase in `[0, guide)`, which always fits a `Duration`.
        duration_from_nanos(phase.cast_unsigned()).unwrap_or(Duration::ZERO)
    }

    /// Returns how long to wait so that the next firing lands on the next aligned boundary,
    /// or `None` when `now` is already within the correction threshold of a boundary.
    #[must_use]
    pub fn correction_wait(&self, now: SystemTime, offset: Offset) -> Option<Duration> {
        let phase = self.phase(now, offset);

        if phase < self.correction_threshold {
            return None;
        }

        Some(self.guide - phase)
    }
}

fn duration_from_nanos(nanos: u128) -> Option<Duration> {
    let seconds = u64::try_from(nanos / NANOS_PER_SECOND).ok()?;
    let subsec = u32::try_from(nanos % NANOS_PER_SECOND).ok()?;

    Some(Duration::new(seconds, subsec))
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(AlignmentParameters: Send, Sync, Copy);
    }

    #[test]
    fn zero_interval_rejected() {
        for correction in [false, true] {
            let error = AlignmentParameters::new(Duration::ZERO, correction).unwrap_err();

            assert_eq!(error.kind(), ErrorKind::ZeroInterval);
        }
    }

    #[test]
    fn sub_second_interval() {
        let parameters = AlignmentParameters::new(Duration::from_millis(100), true).unwrap();

        assert_eq!(parameters.effective_interval(), Duration::from_millis(100));
        assert_eq!(parameters.guide(), Duration::from_millis(100));
        assert_eq!(parameters.correction_threshold(), Duration::from_millis(10));
    }

    #[test]
    fn sub_second_interval_rounds_up_to_quantum() {
        let parameters = AlignmentParameters::new(Duration::from_millis(250), true).unwrap();

        assert_eq!(parameters.guide(), Duration::from_millis(300));
    }

    #[test]
    fn short_interval_raised_with_correction() {
        let parameters = AlignmentParameters::new(Duration::from_millis(20), true).unwrap();

        assert_eq!(parameters.effective_interval(), MIN_CORRECTED_INTERVAL);
        assert_eq!(parameters.guide(), MIN_CORRECTED_INTERVAL);
    }

    #[test]
    fn short_interval_kept_without_correction() {
        let parameters = AlignmentParameters::new(Duration::from_millis(20), false).unwrap();

        assert_eq!(parameters.effective_interval(), Duration::from_millis(20));
        assert_eq!(parameters.guide(), Duration::from_millis(100));
    }

    #[test]
    fn sub_minute_interval() {
        let parameters = AlignmentParameters::new(Duration::from_millis(1500), true).unwrap();

        assert_eq!(parameters.guide(), Duration::from_secs(2));
        assert_eq!(parameters.correction_threshold(), Duration::from_millis(100));
    }

    #[test]
    fn sub_hour_interval_ceils_to_minute() {
        let parameters = AlignmentParameters::new(Duration::from_secs(90), true).unwrap();

        assert_eq!(parameters.guide(), Duration::from_secs(120));
        assert_eq!(parameters.correction_threshold(), Duration::from_secs(1));
    }

    #[test]
    fn even_multiple_is_kept() {
        let parameters = AlignmentParameters::new(Duration::from_secs(300), true).unwrap();

        assert_eq!(parameters.guide(), Duration::from_secs(300));
    }

    #[test]
    fn hour_interval() {
        let parameters = AlignmentParameters::new(Duration::from_secs(3601), false).unwrap();

        assert_eq!(parameters.guide(), Duration::from_secs(7200));
        assert_eq!(parameters.correction_threshold(), Duration::from_secs(60));
    }

    #[test]
    fn huge_interval_saturates_guide() {
        let parameters = AlignmentParameters::new(Duration::MAX, false).unwrap();

        assert_eq!(parameters.guide(), Duration::MAX);
        assert!(parameters.guide() >= parameters.effective_interval());
    }

    #[test]
    fn invariants_hold_across_tiers() {
        for millis in [1, 99, 100, 101, 999, 1000, 59_999, 60_000, 3_599_999, 3_600_000, 86_400_000] {
            for correction in [false, true] {
                let parameters = AlignmentParameters::new(Duration::from_millis(millis), correction).unwrap();

                assert!(parameters.guide() >= parameters.effective_interval(), "{millis}ms");
                assert!(parameters.correction_threshold() < parameters.guide(), "{millis}ms");
                assert!(parameters.effective_interval() > Duration::ZERO, "{millis}ms");
            }
        }
    }

    #[test]
    fn min_spacing_is_half_interval_or_threshold() {
        let parameters = AlignmentParameters::new(Duration::from_secs(1), true).unwrap();
        assert_eq!(parameters.min_spacing(), Duration::from_millis(500));

        let parameters = AlignmentParameters::new(Duration::from_millis(100), true).unwrap();
        assert_eq!(parameters.min_spacing(), Duration::from_millis(50));
    }

    #[test]
    fn phase_with_offset() {
        let parameters = AlignmentParameters::new(Duration::from_secs(60), true).unwrap();
        let offset = Offset::new(5, 0, 0);

        assert_eq!(parameters.phase(at(125_000), offset), Duration::ZERO);
        assert_eq!(parameters.phase(at(126_500), offset), Duration::from_millis(1500));
        assert_eq!(parameters.phase(at(124_000), offset), Duration::from_secs(59));
    }

    #[test]
    fn phase_with_negative_offset() {
        let parameters = AlignmentParameters::new(Duration::from_secs(60), true).unwrap();

        assert_eq!(parameters.phase(at(0), Offset::new(-10, 0, 0)), Duration::from_secs(10));
    }

    #[test]
    fn phase_before_epoch() {
        let parameters = AlignmentParameters::new(Duration::from_secs(60), true).unwrap();
        let before = SystemTime::UNIX_EPOCH - Duration::from_secs(10);

        assert_eq!(parameters.phase(before, Offset::ZERO), Duration::from_secs(50));
    }

    #[test]
    fn no_wait_within_threshold() {
        let parameters = AlignmentParameters::new(Duration::from_secs(1), true).unwrap();

        assert_eq!(parameters.correction_wait(at(5_000), Offset::ZERO), None);
        assert_eq!(parameters.correction_wait(at(5_099), Offset::ZERO), None);
    }

    #[test]
    fn wait_until_next_boundary() {
        let parameters = AlignmentParameters::new(Duration::from_secs(1), true).unwrap();

        assert_eq!(
            parameters.correction_wait(at(5_100), Offset::ZERO),
            Some(Duration::from_millis(900))
        );
        assert_eq!(
            parameters.correction_wait(at(5_999), Offset::ZERO),
            Some(Duration::from_millis(1))
        );
    }

    #[test]
    fn wait_respects_offset() {
        let parameters = AlignmentParameters::new(Duration::from_secs(300), true).unwrap();
        let offset = Offset::new(5, 0, 0);

        // 12:00:00 with a 5s offset waits until 12:00:05.
        let noon = 12 * 3_600_000;
        assert_eq!(parameters.correction_wait(at(noon), offset), Some(Duration::from_secs(5)));
    }
}
