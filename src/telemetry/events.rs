use std::fmt;
use std::time::Duration;

use serde_json::json;

use crate::retry::PollState;

/// Events emitted while a poll sequence runs.
///
/// One event is emitted per state transition out of `Probing`. Failure kinds are rendered with
/// their `Debug` form so sinks stay independent of the caller's kind type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// A retryable failure was absorbed; the poller is about to wait.
    Retrying {
        /// The attempt that failed (1-indexed)
        attempt: usize,
        /// Kind of the absorbed failure
        kind: String,
        /// The backoff delay before the next attempt
        delay: Duration,
    },
    /// The probe completed.
    Succeeded {
        /// Total number of attempts made
        attempts: usize,
        /// Total time spent waiting between attempts
        waited: Duration,
    },
    /// The probe signalled a non-retryable kind.
    Fatal {
        /// The attempt that failed (1-indexed)
        attempt: usize,
        /// Kind of the failure
        kind: String,
    },
    /// The last allowed attempt failed with a retryable kind.
    Exhausted {
        /// Total number of attempts made
        attempts: usize,
        /// Kind of the final failure
        kind: String,
        /// Total time spent waiting between attempts
        waited: Duration,
    },
}

impl PollEvent {
    /// State the poller enters with this event.
    pub fn state(&self) -> PollState {
        match self {
            PollEvent::Retrying { .. } => PollState::Waiting,
            PollEvent::Succeeded { .. } => PollState::Succeeded,
            PollEvent::Fatal { .. } => PollState::FailedFatal,
            PollEvent::Exhausted { .. } => PollState::FailedExhausted,
        }
    }
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollEvent::Retrying { attempt, kind, delay } => {
                write!(f, "Retrying(#{}, kind={}, delay={:?})", attempt, kind, delay)
            }
            PollEvent::Succeeded { attempts, waited } => {
                write!(f, "Succeeded(attempts={}, waited={:?})", attempts, waited)
            }
            PollEvent::Fatal { attempt, kind } => write!(f, "Fatal(#{}, kind={})", attempt, kind),
            PollEvent::Exhausted { attempts, kind, waited } => {
                write!(f, "Exhausted(attempts={}, kind={}, waited={:?})", attempts, kind, waited)
            }
        }
    }
}

#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Convert a PollEvent into a JSON value for sinks.
pub fn event_to_json(event: &PollEvent) -> serde_json::Value {
    match event {
        PollEvent::Retrying { attempt, kind, delay } => json!({
            "kind": "poll_retrying",
            "attempt": *attempt,
            "failure": kind,
            "delay_ms": clamp_u64(delay.as_millis()),
        }),
        PollEvent::Succeeded { attempts, waited } => json!({
            "kind": "poll_succeeded",
            "attempts": *attempts,
            "waited_ms": clamp_u64(waited.as_millis()),
        }),
        PollEvent::Fatal { attempt, kind } => json!({
            "kind": "poll_fatal",
            "attempt": *attempt,
            "failure": kind,
        }),
        PollEvent::Exhausted { attempts, kind, waited } => json!({
            "kind": "poll_exhausted",
            "attempts": *attempts,
            "failure": kind,
            "waited_ms": clamp_u64(waited.as_millis()),
        }),
    }
}
