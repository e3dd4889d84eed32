//! Backoff strategies for the poller.
//!
//! Provides constant and geometric strategies. Attempt semantics: attempt index `0` represents the
//! initial call (no delay), and retries start at `attempt = 1`. The geometric delay before retry
//! `n` is `initial * multiplier^(n-1)`, so the waits between attempts form the series
//! `initial, initial * m, initial * m^2, ...`.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use petclinic_suite::Backoff;
//!
//! let backoff = Backoff::geometric(Duration::from_secs(1), 2.0).unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_secs(1));
//! assert_eq!(backoff.delay(2), Duration::from_secs(2));
//! assert_eq!(backoff.total(2), Duration::from_secs(3));
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError {
    /// Multiplier must be finite and `>= 1.0`.
    InvalidMultiplier(f64),
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::InvalidMultiplier(m) => {
                write!(f, "backoff multiplier must be finite and >= 1.0 (got {})", m)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant { delay: Duration },
    Geometric { initial: Duration, multiplier: f64 },
}

/// Delay schedule applied between poll attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// Delay grows by `multiplier` after every retry.
    pub fn geometric(initial: Duration, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        Ok(Self { kind: BackoffKind::Geometric { initial, multiplier } })
    }

    /// Delay before the first retry.
    pub fn initial(&self) -> Duration {
        match self.kind {
            BackoffKind::Constant { delay } => delay,
            BackoffKind::Geometric { initial, .. } => initial,
        }
    }

    /// Growth factor between consecutive delays (`1.0` for constant).
    pub fn multiplier(&self) -> f64 {
        match self.kind {
            BackoffKind::Constant { .. } => 1.0,
            BackoffKind::Geometric { multiplier, .. } => multiplier,
        }
    }

    /// Calculate the delay for a given attempt number (0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self.kind {
            BackoffKind::Constant { delay } => delay.min(MAX_BACKOFF),
            BackoffKind::Geometric { initial, multiplier } => {
                let exponent = (attempt - 1).min(i32::MAX as usize) as i32;
                let nanos = initial.as_nanos() as f64 * multiplier.powi(exponent);
                if !nanos.is_finite() || nanos >= MAX_BACKOFF.as_nanos() as f64 {
                    MAX_BACKOFF
                } else {
                    Duration::from_nanos(nanos.round() as u64)
                }
            }
        }
    }

    /// Sum of the delays before retries `1..=retries`, saturating at `MAX_BACKOFF` per term.
    pub fn total(&self, retries: usize) -> Duration {
        let mut sum = Duration::ZERO;
        for attempt in 1..=retries {
            let delay = self.delay(attempt);
            // delays never shrink; once they stop growing the tail is a plain product
            if delay == MAX_BACKOFF || self.multiplier() == 1.0 {
                let tail = u32::try_from(retries - attempt + 1).unwrap_or(u32::MAX);
                return sum.saturating_add(delay.saturating_mul(tail));
            }
            sum = sum.saturating_add(delay);
        }
        sum
    }
}
