// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::num::NonZeroUsize;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::task::TaskGuard;
use crate::{AlignedTicker, Error, ErrorKind, Result, TriggerOptions};

/// Lifecycle phase of a [`Scheduler`].
///
/// ```text
///            start                 stop
///   Idle ─────────────▶ Running ─────────▶ Stopped
///   ▲  │ stop (no-op)    │ start (no-op)    │ start, stop (no-op)
///   └──┘                 └──────────────────┘
/// ```
///
/// A stopped scheduler never runs again; create a new one instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum LifecycleState {
    /// Created but never started.
    Idle,
    /// The consumption loop is running.
    Running,
    /// The consumption loop was asked to exit.
    Stopped,
}

/// The result of [`Scheduler::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StartOutcome {
    /// A consumption loop was launched by this call.
    Started,
    /// A consumption loop launched by an earlier call is still running.
    AlreadyRunning,
    /// The scheduler was stopped and cannot be started again.
    Stopped,
}

/// Runs a task on every firing of an [`AlignedTicker`].
///
/// The scheduler owns a ticker, created (and therefore already running) when the scheduler
/// is created, and a single consumption loop that reads firings from it. For each firing the
/// loop hands the task to the runtime without waiting for it, routed through the configured
/// [`DispatchPolicy`][crate::DispatchPolicy] and concurrency cap.
///
/// [`start`][Self::start] launches the consumption loop at most once per scheduler.
/// [`stop`][Self::stop] asks the loop to exit; it does not wait for the loop or for task runs
/// that are still in flight. Dropping the scheduler stops it as well.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use metronome::{Scheduler, StartOutcome, Task, TriggerOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> metronome::Result<()> {
/// let options = TriggerOptions::new(Task::from_async(|| async { println!("heartbeat") }))
///     .with_interval(Duration::from_secs(30))
///     .with_correction(true);
///
/// let scheduler = Scheduler::new(options)?;
/// assert_eq!(scheduler.start(), StartOutcome::Started);
/// assert_eq!(scheduler.start(), StartOutcome::AlreadyRunning);
///
/// scheduler.stop();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    handle: Handle,
    state: Mutex<State>,
}

#[derive(Debug)]
enum State {
    Idle { ticker: AlignedTicker, guard: TaskGuard },
    Running { stop: oneshot::Sender<()> },
    Stopped,
}

impl Scheduler {
    /// Creates a scheduler and its ticker on the current Tokio runtime.
    ///
    /// The ticker starts driving right away. With the first-trigger option its first firing
    /// waits in the ticker until [`start`][Self::start] is called.
    ///
    /// # Errors
    ///
    /// Returns an error when the options carry no task ([`ErrorKind::MissingTask`]), when
    /// there is no current Tokio runtime ([`ErrorKind::NoRuntime`]), or when the ticker rejects
    /// the options (see [`AlignedTicker::new`]).
    pub fn new(options: TriggerOptions) -> Result<Self> {
        let Some(task) = options.task().cloned() else {
            return Err(Error::from_kind(ErrorKind::MissingTask));
        };

        let Ok(handle) = Handle::try_current() else {
            return Err(Error::from_kind(ErrorKind::NoRuntime));
        };

        let ticker = AlignedTicker::with_handle(&handle, options.ticker_settings(), options.time_source())?;
        let guard = TaskGuard::new(
            task,
            options.dispatch_policy(),
            options.max_concurrent_tasks().map(NonZeroUsize::get),
        );

        Ok(Self {
            handle,
            state: Mutex::new(State::Idle { ticker, guard }),
        })
    }

    /// Launches the consumption loop unless it was launched before.
    ///
    /// Returns immediately; the loop runs on the runtime the scheduler was created on.
    pub fn start(&self) -> StartOutcome {
        let mut state = self.state.lock();

        match std::mem::replace(&mut *state, State::Stopped) {
            State::Idle { ticker, guard } => {
                let (stop, stopped) = oneshot::channel();
                drop(self.handle.spawn(consume(ticker, guard, self.handle.clone(), stopped)));
                *state = State::Running { stop };

                tracing::info!("scheduler started");
                StartOutcome::Started
            }
            running @ State::Running { .. } => {
                *state = running;
                StartOutcome::AlreadyRunning
            }
            State::Stopped => StartOutcome::Stopped,
        }
    }

    /// Asks the consumption loop to exit.
    ///
    /// Does not wait for the loop to observe the request, nor for task runs in flight.
    /// Stopping a scheduler that is idle or already stopped does nothing.
    pub fn stop(&self) {
        let mut state = self.state.lock();

        if !matches!(*state, State::Running { .. }) {
            return;
        }

        if let State::Running { stop } = std::mem::replace(&mut *state, State::Stopped)
            && stop.send(()).is_err()
        {
            tracing::debug!("consumption loop already exited");
        }

        tracing::info!("scheduler stopped");
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        match *self.state.lock() {
            State::Idle { .. } => LifecycleState::Idle,
            State::Running { .. } => LifecycleState::Running,
            State::Stopped => LifecycleState::Stopped,
        }
    }
}

impl TryFrom<Option<TriggerOptions>> for Scheduler {
    type Error = Error;

    /// Creates a scheduler from options that may be absent.
    ///
    /// Fails with [`ErrorKind::MissingOptions`] when they are, and otherwise behaves like
    /// [`Scheduler::new`].
    fn try_from(options: Option<TriggerOptions>) -> Result<Self> {
        match options {
            Some(options) => Self::new(options),
            None => Err(Error::from_kind(ErrorKind::MissingOptions)),
        }
    }
}

/// Reads firings until asked to stop, dispatching the task for each one.
async fn consume(mut ticker: AlignedTicker, guard: TaskGuard, handle: Handle, mut stopped: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            biased;

            // Either an explicit stop or a dropped scheduler.
            _ = &mut stopped => break,

            firing = ticker.tick() => {
                let Some(fired_at) = firing else {
                    break;
                };

                tracing::trace!(?fired_at, "dispatching task");
                guard.trigger(&handle);
            }
        }
    }

    tracing::debug!("consumption loop exited");
}
