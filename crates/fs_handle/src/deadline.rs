// Copyright (c) The fs_handle Project Authors.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use crate::{Error, Result};

/// A time budget governing how long a blocking operation may wait.
///
/// Every blocking operation in this crate accepts a `Deadline`. A multi-step operation
/// (for example a scatter/gather request that waits on several native operations in turn)
/// re-derives the remaining budget before each wait step, so the operation as a whole can
/// never exceed the caller's deadline even though it waits on each sub-operation
/// individually. This is done through [`Deadline::timer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Deadline {
    /// Block until the operation completes, however long that takes.
    #[default]
    Infinite,

    /// Do not block: try the operation once and fail with [`Error::TimedOut`] if it is not
    /// immediately ready.
    Zero,

    /// Block for at most this long, measured from the start of the operation.
    Relative(Duration),

    /// Block until this point in time.
    Absolute(Instant),
}

impl Deadline {
    /// Whether this deadline imposes a finite, nonzero time bound.
    ///
    /// Handles that are not capable of overlapped I/O reject such deadlines with
    /// [`Error::NotSupported`], since their native operations cannot be waited on with a
    /// timeout. [`Deadline::Infinite`] and [`Deadline::Zero`] remain valid everywhere.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Relative(_) | Self::Absolute(_))
    }

    /// Starts the clock on this deadline, producing the timer that wait steps consult.
    #[must_use]
    pub fn timer(self) -> DeadlineTimer {
        let expires_at = match self {
            Self::Infinite | Self::Zero => None,
            Self::Relative(budget) => Some(Instant::now() + budget),
            Self::Absolute(at) => Some(at),
        };

        DeadlineTimer {
            expires_at,
            poll_only: self == Self::Zero,
        }
    }
}

/// A started [`Deadline`]: tracks the absolute expiry point so that each wait step of a
/// multi-step operation consumes elapsed time and observes only the remaining budget.
#[derive(Clone, Copy, Debug)]
pub struct DeadlineTimer {
    expires_at: Option<Instant>,
    poll_only: bool,
}

impl DeadlineTimer {
    /// Whether the originating deadline was [`Deadline::Zero`].
    #[must_use]
    pub fn is_poll(&self) -> bool {
        self.poll_only
    }

    /// The remaining budget, or `None` when the deadline is unbounded.
    ///
    /// A [`Deadline::Zero`] origin always reports a zero budget. A fully elapsed finite
    /// deadline also reports zero; it never reports success by wrapping.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        if self.poll_only {
            return Some(Duration::ZERO);
        }

        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The remaining budget split evenly across `parts` pending wait steps.
    ///
    /// Used when several native operations are in flight for one request: each is waited
    /// on with a slice of the remaining budget so that later operations are not starved
    /// by an early one consuming everything.
    #[must_use]
    pub fn remaining_per(&self, parts: usize) -> Option<Duration> {
        self.remaining()
            .map(|budget| budget / u32::try_from(parts.max(1)).unwrap_or(u32::MAX))
    }

    /// Fails with [`Error::TimedOut`] once the budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimedOut`] when a finite deadline has fully elapsed or the
    /// originating deadline was [`Deadline::Zero`].
    pub fn check(&self) -> Result<()> {
        match self.remaining() {
            Some(Duration::ZERO) => Err(Error::TimedOut),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_never_expires() {
        let timer = Deadline::Infinite.timer();
        assert_eq!(timer.remaining(), None);
        timer.check().expect("infinite deadline must never expire");
    }

    #[test]
    fn zero_is_immediately_exhausted() {
        let timer = Deadline::Zero.timer();
        assert!(timer.is_poll());
        assert_eq!(timer.remaining(), Some(Duration::ZERO));
        assert!(matches!(timer.check(), Err(Error::TimedOut)));
    }

    #[test]
    fn relative_counts_down() {
        let timer = Deadline::Relative(Duration::from_secs(60)).timer();
        let remaining = timer.remaining().expect("finite deadline has a budget");
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));
        timer.check().expect("fresh one-minute deadline is not expired");
    }

    #[test]
    fn elapsed_relative_reports_timeout() {
        let timer = Deadline::Relative(Duration::ZERO).timer();
        assert!(matches!(timer.check(), Err(Error::TimedOut)));
    }

    #[test]
    fn absolute_in_the_past_reports_timeout() {
        let timer = Deadline::Absolute(Instant::now()).timer();
        std::thread::sleep(Duration::from_millis(1));
        assert!(matches!(timer.check(), Err(Error::TimedOut)));
    }

    #[test]
    fn partitions_budget_across_steps() {
        let timer = Deadline::Relative(Duration::from_secs(40)).timer();
        let slice = timer.remaining_per(4).expect("finite deadline has a budget");
        assert!(slice <= Duration::from_secs(10));
        assert!(slice > Duration::from_secs(9));
    }

    #[test]
    fn finiteness_classification() {
        assert!(!Deadline::Infinite.is_finite());
        assert!(!Deadline::Zero.is_finite());
        assert!(Deadline::Relative(Duration::from_secs(1)).is_finite());
        assert!(Deadline::Absolute(Instant::now()).is_finite());
    }
}
