// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::unchecked_time_subtraction,
        reason = "allow these lints in tests to improve the readability of the tests"
    )
)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Periodic task trigger with wall-clock alignment and drift correction.
//!
//! Give it a callback and an interval, and it keeps firing the callback inside your process.
//! Optionally, firings are aligned to wall-clock boundaries, such as "every 5 minutes on the
//! minute, 10 seconds past", and kept there by correcting for timer drift.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use metronome::{Scheduler, Task, TriggerOptions};
//!
//! #[tokio::main]
//! async fn main() -> metronome::Result<()> {
//!     let options = TriggerOptions::new(Task::from_async(|| async { println!("rotate logs") }))
//!         .with_interval(Duration::from_secs(300))
//!         .with_correction(true)
//!         .with_offset(10, 0, 0);
//!
//!     let scheduler = Scheduler::new(options)?;
//!     scheduler.start();
//!
//!     tokio::time::sleep(Duration::from_secs(3600)).await;
//!     scheduler.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Overview
//!
//! - [`AlignedTicker`] - The periodic-firing primitive. Drives a physical timer, aligns firings
//!   to offset-shifted boundaries when correction is enabled, drops firings that come too close
//!   together, and exposes firings as a [`Stream`](futures_core::Stream) of timestamps.
//! - [`Scheduler`] - Consumes the firings of a ticker and runs a [`Task`] for each one, with
//!   start/stop lifecycle control.
//! - [`TriggerOptions`] and [`TickerSettings`] - Configuration with defaults.
//! - [`AlignmentParameters`] - The guide, correction threshold and effective interval derived
//!   from an interval.
//! - [`DispatchPolicy`] - Whether every firing runs the task, only non-overlapping ones, or only
//!   the first.
//! - [`TimeSource`] - Pluggable provider of the current wall-clock time, such as a [`tick::Clock`].
//!
//! # Alignment
//!
//! With correction enabled the interval is first raised to at least
//! [`MIN_CORRECTED_INTERVAL`]. The alignment period (the *guide*) is the interval rounded up to
//! a quantum chosen by its magnitude:
//!
//! | Interval          | Quantum | Correction threshold |
//! |-------------------|---------|----------------------|
//! | below 1 second    | 100ms   | 10ms                 |
//! | below 1 minute    | 1s      | 100ms                |
//! | below 1 hour      | 1min    | 1s                   |
//! | 1 hour and above  | 1h      | 1min                 |
//!
//! Before each firing the ticker measures how far "now minus offset" is past a multiple of the
//! guide. Past the threshold, it waits for the next multiple and restarts its timer from there.
//!
//! # Runtime
//!
//! Everything runs on Tokio. Tickers and schedulers capture the current runtime when they are
//! created and fail with [`ErrorKind::NoRuntime`] outside of one. Asynchronous tasks are spawned
//! as Tokio tasks; synchronous tasks run on the blocking thread pool.
//!
//! # Features
//!
//! - **`serde`** - Serialization of [`Offset`], [`TickerSettings`] and [`DispatchPolicy`] so that
//!   they can be part of a host's configuration files.

mod alignment;
mod error;
mod offset;
mod options;
mod scheduler;
mod spacing;
mod task;
mod ticker;
mod time_source;

pub use alignment::{AlignmentParameters, MIN_CORRECTED_INTERVAL};
pub use error::{Error, ErrorKind, Result};
pub use offset::Offset;
pub use options::{DEFAULT_INTERVAL, TickerSettings, TriggerOptions};
pub use scheduler::{LifecycleState, Scheduler, StartOutcome};
pub use task::{DispatchPolicy, Task};
pub use ticker::AlignedTicker;
pub use time_source::TimeSource;
