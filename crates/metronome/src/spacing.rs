// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::AlignmentParameters;

/// Drops candidate firings that arrive too soon after the last delivered one.
///
/// A correction wait followed by a timer reset can produce two physical firings that are
/// much closer together than the nominal cadence. With correction enabled, a candidate is
/// accepted only when at least [`AlignmentParameters::min_spacing`] has passed since the
/// previous delivery. Without correction every candidate is accepted.
#[derive(Debug)]
pub(crate) struct SpacingGuard {
    min_spacing: Option<Duration>,
    last_delivered: RwLock<Option<Instant>>,
}

impl SpacingGuard {
    pub(crate) fn new(parameters: &AlignmentParameters, correction: bool) -> Self {
        Self {
            min_spacing: correction.then(|| parameters.min_spacing()),
            last_delivered: RwLock::new(None),
        }
    }

    /// Checks the candidate arriving at `now` and records it as delivered when accepted.
    ///
    /// The check and the update happen under a single write lock.
    pub(crate) fn try_accept(&self, now: Instant) -> bool {
        let mut last_delivered = self.last_delivered.write();

        if let (Some(min_spacing), Some(last)) = (self.min_spacing, *last_delivered) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < min_spacing {
                tracing::debug!(
                    elapsed.ms = elapsed.as_millis(),
                    min_spacing.ms = min_spacing.as_millis(),
                    "dropping firing that follows the previous one too closely"
                );
                return false;
            }
        }

        *last_delivered = Some(now);
        true
    }

    /// Returns when the last firing was accepted, if any.
    pub(crate) fn last_delivered(&self) -> Option<Instant> {
        *self.last_delivered.read()
    }
}
