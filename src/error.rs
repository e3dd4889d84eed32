//! Error types for the poller
use crate::failure::Failure;
use std::fmt;
/// Terminal failure of a poll sequence.
///
/// Both variants carry the failure of the final attempt exactly as the probe produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<K> {
    /// The probe signalled a kind outside the retryable set; no retry was made
    Fatal { attempt: usize, failure: Failure<K> },
    /// Every attempt failed with a retryable kind
    Exhausted { attempts: usize, failure: Failure<K> },
}
impl<K: fmt::Debug> fmt::Display for PollError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal { attempt, failure } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempt, failure)
            }
            Self::Exhausted { attempts, failure } => {
                write!(f, "still failing after {} attempts; last error: {}", attempts, failure)
            }
        }
    }
}
impl<K: fmt::Debug + 'static> std::error::Error for PollError<K> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.failure())
    }
}
impl<K> PollError<K> {
    /// Borrow the failure of the final attempt.
    pub fn failure(&self) -> &Failure<K> {
        match self {
            Self::Fatal { failure, .. } | Self::Exhausted { failure, .. } => failure,
        }
    }
    /// Take the failure of the final attempt.
    pub fn into_failure(self) -> Failure<K> {
        match self {
            Self::Fatal { failure, .. } | Self::Exhausted { failure, .. } => failure,
        }
    }
    /// Kind of the final failure.
    pub fn kind(&self) -> &K {
        self.failure().kind()
    }
    /// Number of times the probe was invoked.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Fatal { attempt, .. } => *attempt,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }
    /// Check if the sequence stopped on a non-retryable kind
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
    /// Check if the sequence ran out of attempts
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}
