// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// The result type for fallible operations that use the [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error raised while constructing an [`AlignedTicker`][crate::AlignedTicker] or a
/// [`Scheduler`][crate::Scheduler].
///
/// All errors are reported synchronously at construction time. Once a ticker or scheduler
/// exists, none of its operations fail.
///
/// Use [`Error::kind`] to find out which precondition was violated.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use metronome::{AlignedTicker, ErrorKind, TickerSettings, TimeSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let settings = TickerSettings::new(Duration::ZERO);
/// let error = AlignedTicker::new(settings, TimeSource::system()).unwrap_err();
///
/// assert_eq!(error.kind(), ErrorKind::ZeroInterval);
/// # }
/// ```
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

/// The precondition violated by a failed construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No options were supplied to the scheduler.
    #[error("options cannot be empty")]
    MissingOptions,

    /// The options do not carry a task callback.
    #[error("task cannot be empty")]
    MissingTask,

    /// The ticker interval is zero.
    #[error("time interval cannot be zero")]
    ZeroInterval,

    /// The offset is equal to or longer than the effective interval.
    #[error("the offset must be less than the interval")]
    OffsetNotLessThanInterval,

    /// Construction happened outside of a Tokio runtime.
    #[error("a Tokio runtime is required to drive the ticker")]
    NoRuntime,
}

impl Error {
    pub(crate) const fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    /// Returns the violated precondition.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.0
    }
}
