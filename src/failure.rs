//! Probe failures.
//!
//! A probe reports "not yet" or "never" by returning a [`Failure`] tagged with a caller-defined
//! kind. The poller only looks at the kind to decide whether to retry; the detail travels with the
//! failure untouched so the final error reads exactly like the last attempt.

use std::fmt;

/// Outcome of a single probe attempt.
pub type Outcome<T, K> = Result<T, Failure<K>>;

/// A failed probe attempt: a classification plus a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure<K> {
    kind: K,
    detail: String,
}

impl<K> Failure<K> {
    pub fn new(kind: K, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Keep the kind, replace the detail with `context: detail`.
    pub fn context(self, context: impl fmt::Display) -> Self {
        Self { detail: format!("{}: {}", context, self.detail), kind: self.kind }
    }
}

impl<K: fmt::Debug> fmt::Display for Failure<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

impl<K: fmt::Debug> std::error::Error for Failure<K> {}
