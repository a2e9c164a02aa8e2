// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;

use futures_core::Stream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::spacing::SpacingGuard;
use crate::{AlignmentParameters, Error, ErrorKind, Offset, Result, TickerSettings, TimeSource};

/// A periodic timer that can align its firings to wall-clock boundaries.
///
/// The ticker is live as soon as it exists: construction spawns a drive loop on the current
/// Tokio runtime. The loop waits on a physical timer running at the
/// [effective interval][AlignmentParameters::effective_interval] and, for each tick:
///
/// 1. With correction enabled, reads the [`TimeSource`] and, when the current phase relative
///    to the offset-shifted [guide][AlignmentParameters::guide] exceeds the correction
///    threshold, waits until the next boundary and restarts the physical timer from there.
/// 2. With correction enabled, drops the firing if it follows the previous delivered one by
///    less than [`AlignmentParameters::min_spacing`].
/// 3. Delivers the current time to a single-slot channel. While the slot is full the drive
///    loop waits, so a slow consumer delays the ticker rather than queuing firings.
///
/// With the first-trigger setting, one firing is delivered right away (after a correction
/// wait, if enabled) before the physical timer fires.
///
/// Firings are read with [`AlignedTicker::tick`] or through the [`Stream`] implementation.
/// The sequence never ends while the ticker is alive. Dropping the ticker stops the drive loop.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use metronome::{AlignedTicker, TickerSettings, TimeSource};
///
/// # #[tokio::main]
/// # async fn main() -> metronome::Result<()> {
/// // Fire every 5 minutes on the minute.
/// let settings = TickerSettings::new(Duration::from_secs(300)).with_correction(true);
/// let mut ticker = AlignedTicker::new(settings, TimeSource::system())?;
///
/// while let Some(fired_at) = ticker.tick().await {
///     println!("fired at {fired_at:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AlignedTicker {
    firings: mpsc::Receiver<SystemTime>,
    settings: TickerSettings,
    parameters: AlignmentParameters,
    spacing: Arc<SpacingGuard>,
    driver: JoinHandle<()>,
}

impl AlignedTicker {
    /// Creates a ticker and starts driving it on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when:
    ///
    /// - the interval is zero ([`ErrorKind::ZeroInterval`]),
    /// - the offset is not strictly shorter than the effective interval
    ///   ([`ErrorKind::OffsetNotLessThanInterval`]),
    /// - there is no current Tokio runtime ([`ErrorKind::NoRuntime`]).
    pub fn new(settings: TickerSettings, time_source: TimeSource) -> Result<Self> {
        let parameters = validate(&settings)?;

        let Ok(handle) = Handle::try_current() else {
            return Err(Error::from_kind(ErrorKind::NoRuntime));
        };

        Ok(Self::spawn(&handle, settings, parameters, time_source))
    }

    /// Creates a ticker driven by the runtime behind `handle`.
    pub(crate) fn with_handle(handle: &Handle, settings: TickerSettings, time_source: TimeSource) -> Result<Self> {
        let parameters = validate(&settings)?;

        Ok(Self::spawn(handle, settings, parameters, time_source))
    }

    fn spawn(handle: &Handle, settings: TickerSettings, parameters: AlignmentParameters, time_source: TimeSource) -> Self {
        let (sender, firings) = mpsc::channel(1);
        let spacing = Arc::new(SpacingGuard::new(&parameters, settings.correction()));

        tracing::debug!(
            interval.ms = parameters.effective_interval().as_millis(),
            guide.ms = parameters.guide().as_millis(),
            threshold.ms = parameters.correction_threshold().as_millis(),
            correction = settings.correction(),
            first_trigger = settings.first_trigger(),
            "starting ticker"
        );

        let driver = Driver {
            settings,
            parameters,
            time_source,
            spacing: Arc::clone(&spacing),
            sender,
        };

        Self {
            firings,
            settings,
            parameters,
            spacing,
            driver: handle.spawn(driver.run()),
        }
    }

    /// Waits for the next firing and returns its time as read from the time source.
    ///
    /// Returns `None` only if the drive loop is gone, which does not happen while the
    /// ticker is alive unless the runtime is shutting down.
    pub async fn tick(&mut self) -> Option<SystemTime> {
        self.firings.recv().await
    }

    /// Polls for the next firing.
    pub fn poll_tick(&mut self, cx: &mut Context<'_>) -> Poll<Option<SystemTime>> {
        self.firings.poll_recv(cx)
    }

    /// Returns the alignment values derived from the settings.
    #[must_use]
    pub fn parameters(&self) -> &AlignmentParameters {
        &self.parameters
    }

    /// Returns the settings the ticker was created with.
    #[must_use]
    pub fn settings(&self) -> &TickerSettings {
        &self.settings
    }

    /// Returns the phase shift.
    #[must_use]
    pub fn offset(&self) -> Offset {
        self.settings.offset()
    }

    /// Returns when the last firing was accepted for delivery, if any.
    #[must_use]
    pub fn last_delivered(&self) -> Option<std::time::Instant> {
        self.spacing.last_delivered().map(Instant::into_std)
    }
}

impl Stream for AlignedTicker {
    type Item = SystemTime;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_tick(cx)
    }
}

impl Drop for AlignedTicker {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn validate(settings: &TickerSettings) -> Result<AlignmentParameters> {
    let parameters = AlignmentParameters::new(settings.interval(), settings.correction())?;

    if !settings.offset().is_less_than(parameters.effective_interval()) {
        return Err(Error::from_kind(ErrorKind::OffsetNotLessThanInterval));
    }

    Ok(parameters)
}

/// The drive loop. Owns everything it touches except the spacing guard, which the ticker
/// reads for [`AlignedTicker::last_delivered`].
struct Driver {
    settings: TickerSettings,
    parameters: AlignmentParameters,
    time_source: TimeSource,
    spacing: Arc<SpacingGuard>,
    sender: mpsc::Sender<SystemTime>,
}

impl Driver {
    #[cfg_attr(test, mutants::skip)] // Mutating the loop causes test timeouts.
    async fn run(self) {
        let period = self.parameters.effective_interval();

        let Some(start) = Instant::now().checked_add(period) else {
            // A period this long never elapses; there is nothing to drive.
            return std::future::pending().await;
        };

        let mut timer = tokio::time::interval_at(start, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.settings.first_trigger() {
            self.correct(&mut timer).await;
            if !self.deliver().await {
                return;
            }
        }

        loop {
            timer.tick().await;
            self.correct(&mut timer).await;
            if !self.deliver().await {
                return;
            }
        }
    }

    /// Waits until the next aligned boundary when the current phase is off by more than the
    /// correction threshold, then restarts the physical timer.
    async fn correct(&self, timer: &mut Interval) {
        if !self.settings.correction() {
            return;
        }

        let now = self.time_source.now();
        let Some(wait) = self.parameters.correction_wait(now, self.settings.offset()) else {
            return;
        };

        tracing::debug!(wait.ms = wait.as_millis(), "waiting for aligned boundary");
        tokio::time::sleep(wait).await;
        timer.reset();
    }

    /// Passes a candidate firing through the spacing guard and delivers it. Returns `false`
    /// once nobody is listening anymore.
    async fn deliver(&self) -> bool {
        if !self.spacing.try_accept(Instant::now()) {
            return true;
        }

        let fired_at = self.time_source.now();
        tracing::trace!(?fired_at, "delivering firing");

        if self.sender.send(fired_at).await.is_err() {
            tracing::debug!("firing receiver dropped, stopping ticker");
            return false;
        }

        true
    }
}
