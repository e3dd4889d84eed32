//! Pre-configured poll policies used throughout the suite.
//!
//! - [`eventually`]: wait for the platform to converge (50 attempts, 0.5 s growing by 1.1x, about
//!   nine minutes of waiting in the worst case).
//! - [`every`]: fixed-interval polling that gives up once `timeout` worth of waits has elapsed.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::{Backoff, RetryPolicy, Sleeper, ThreadSleeper};

const EVENTUALLY_ATTEMPTS: usize = 50;
const EVENTUALLY_INITIAL_DELAY_MILLIS: u64 = 500;
const EVENTUALLY_MULTIPLIER: f64 = 1.1;

/// Convergence policy: retry `kinds` with geometric backoff.
pub fn eventually<K, I>(kinds: I) -> RetryPolicy<K>
where
    K: fmt::Debug + Eq + Hash,
    I: IntoIterator<Item = K>,
{
    eventually_with_sleeper(kinds, Arc::new(ThreadSleeper))
}

/// [`eventually`] with an injected sleeper.
pub fn eventually_with_sleeper<K, I>(kinds: I, sleeper: Arc<dyn Sleeper>) -> RetryPolicy<K>
where
    K: fmt::Debug + Eq + Hash,
    I: IntoIterator<Item = K>,
{
    RetryPolicy::builder()
        .max_attempts(EVENTUALLY_ATTEMPTS)
        .backoff(eventually_backoff())
        .retry_on_all(kinds)
        .with_shared_sleeper(sleeper)
        .build_clamped()
}

fn eventually_backoff() -> Backoff {
    match Backoff::geometric(
        Duration::from_millis(EVENTUALLY_INITIAL_DELAY_MILLIS),
        EVENTUALLY_MULTIPLIER,
    ) {
        Ok(backoff) => backoff,
        // the multiplier constant is above 1.0
        Err(_) => Backoff::constant(Duration::from_millis(EVENTUALLY_INITIAL_DELAY_MILLIS)),
    }
}

/// Poll every `interval` until about `timeout` has been spent waiting; at least one attempt.
pub fn every<K, I>(
    interval: Duration,
    timeout: Duration,
    kinds: I,
    sleeper: Arc<dyn Sleeper>,
) -> RetryPolicy<K>
where
    K: fmt::Debug + Eq + Hash,
    I: IntoIterator<Item = K>,
{
    let waits = if interval.is_zero() {
        0
    } else {
        usize::try_from(timeout.as_nanos().div_ceil(interval.as_nanos())).unwrap_or(usize::MAX)
    };
    RetryPolicy::builder()
        .max_attempts(waits.saturating_add(1))
        .backoff(Backoff::constant(interval))
        .retry_on_all(kinds)
        .with_shared_sleeper(sleeper)
        .build_clamped()
}
