//! Eventual-condition poller
//!
//! Retry policy for fallible, blocking probes.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - A probe fails by returning a [`Failure`] tagged with a caller-defined kind. Kinds in the
//!   retryable set are absorbed until attempts run out; any other kind is returned immediately.
//! - Backoff calculates the delay per retry; the sleeper blocks the caller's thread for it
//!   (production uses [`ThreadSleeper`]; tests inject [`InstantSleeper`]/`TrackingSleeper`).
//! - The final failure is surfaced verbatim inside [`PollError`].
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`.
//! - Non-retryable failures never incur a wait.
//! - The sleeper is invoked exactly `attempts - 1` times for a sequence that retried.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use petclinic_suite::{Backoff, Failure, InstantSleeper, RetryPolicy};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Kind { Timeout }
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3) // total attempts
//!     .backoff(Backoff::geometric(Duration::from_secs(1), 2.0).unwrap())
//!     .retry_on(Kind::Timeout)
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let mut calls = 0;
//! let value = policy.execute(|| {
//!     calls += 1;
//!     if calls < 3 { Err(Failure::new(Kind::Timeout, "not yet")) } else { Ok(42) }
//! });
//! assert_eq!(value.unwrap(), 42);
//! ```

use crate::failure::Failure;
use crate::telemetry::{EventSink, LogSink, PollEvent};
use crate::{Backoff, PollError, Sleeper, ThreadSleeper};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// States of a poll sequence.
///
/// `Probing` is initial; `Succeeded`, `FailedFatal` and `FailedExhausted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    Probing,
    Waiting,
    Succeeded,
    FailedFatal,
    FailedExhausted,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PollState::Succeeded | PollState::FailedFatal | PollState::FailedExhausted)
    }
}

/// Retry policy combining attempt bound, backoff, retryable kinds, sleeper and telemetry sink.
#[derive(Clone)]
pub struct RetryPolicy<K> {
    max_attempts: usize,
    backoff: Backoff,
    retryable: Arc<HashSet<K>>,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn EventSink>,
}

impl<K: fmt::Debug> fmt::Debug for RetryPolicy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("retryable", &self.retryable)
            .field("sleeper", &self.sleeper)
            .field("sink", &self.sink)
            .finish()
    }
}

impl<K> RetryPolicy<K>
where
    K: fmt::Debug + Eq + Hash,
{
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder<K> {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether failures of `kind` are absorbed and retried.
    pub fn is_retryable(&self, kind: &K) -> bool {
        self.retryable.contains(kind)
    }

    /// Upper bound on the time spent sleeping by one sequence.
    pub fn max_total_wait(&self) -> Duration {
        self.backoff.total(self.max_attempts - 1)
    }

    /// Invoke `probe` until it succeeds, fails with a non-retryable kind, or attempts run out.
    pub fn execute<T, P>(&self, mut probe: P) -> Result<T, PollError<K>>
    where
        P: FnMut() -> Result<T, Failure<K>>,
    {
        let mut attempt = 1;
        let mut waited = Duration::ZERO;
        let mut state = PollState::Probing;

        loop {
            debug_assert!(!state.is_terminal(), "poll loop resumed from a terminal state");
            if state == PollState::Waiting {
                // Waiting -> Probing after the delay has elapsed
                attempt += 1;
                state = PollState::Probing;
            }

            let failure = match probe() {
                Ok(value) => {
                    self.sink.emit(&PollEvent::Succeeded { attempts: attempt, waited });
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !self.is_retryable(failure.kind()) {
                self.sink
                    .emit(&PollEvent::Fatal { attempt, kind: format!("{:?}", failure.kind()) });
                return Err(PollError::Fatal { attempt, failure });
            }

            if attempt >= self.max_attempts {
                self.sink.emit(&PollEvent::Exhausted {
                    attempts: attempt,
                    kind: format!("{:?}", failure.kind()),
                    waited,
                });
                return Err(PollError::Exhausted { attempts: attempt, failure });
            }

            // Retry n waits backoff.delay(n): initial * multiplier^(n-1)
            let delay = self.backoff.delay(attempt);
            self.sink.emit(&PollEvent::Retrying {
                attempt,
                kind: format!("{:?}", failure.kind()),
                delay,
            });
            state = PollState::Waiting;
            self.sleeper.sleep(delay);
            waited = waited.saturating_add(delay);
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder<K> {
    max_attempts: usize,
    backoff: Backoff,
    retryable: HashSet<K>,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn EventSink>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    InvalidMaxAttempts(usize),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl<K> RetryPolicyBuilder<K>
where
    K: fmt::Debug + Eq + Hash,
{
    /// Create a builder with sane defaults: three attempts, one second constant backoff, no
    /// retryable kinds.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::constant(Duration::from_secs(1)),
            retryable: HashSet::new(),
            sleeper: Arc::new(ThreadSleeper),
            sink: Arc::new(LogSink),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Absorb failures of `kind` and retry them.
    pub fn retry_on(mut self, kind: K) -> Self {
        self.retryable.insert(kind);
        self
    }

    /// Absorb failures of every kind in `kinds`.
    pub fn retry_on_all<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        self.retryable.extend(kinds);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Share an existing sleeper between several policies.
    pub fn with_shared_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Route poll events to `sink` instead of `tracing`.
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: EventSink + 'static,
    {
        self.sink = Arc::new(sink);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy<K>, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retryable: Arc::new(self.retryable),
            sleeper: self.sleeper,
            sink: self.sink,
        })
    }

    /// Build with `max_attempts` raised to at least one; for presets whose bounds are computed.
    pub(crate) fn build_clamped(self) -> RetryPolicy<K> {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff,
            retryable: Arc::new(self.retryable),
            sleeper: self.sleeper,
            sink: self.sink,
        }
    }
}

impl<K> Default for RetryPolicyBuilder<K>
where
    K: fmt::Debug + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
