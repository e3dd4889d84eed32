#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # PetClinic suite
//!
//! Drives a cloud-orchestration platform over HTTP to check that the PetClinic sample application
//! provisions, serves traffic, scales and picks up a new source branch, across a matrix of cloud
//! images.
//!
//! The platform is eventually consistent, so nearly every assertion goes through the poller:
//!
//! - **[`RetryPolicy`]**: invoke a probe until it succeeds, fails with a non-retryable kind, or
//!   attempts run out; geometric backoff between attempts
//! - **[`Failure`] / [`PollError`]**: caller-defined failure kinds; the final failure is returned
//!   verbatim
//! - **[`Sleeper`]**: blocking waits, swappable for tests
//! - **[`telemetry`]**: one event per poll transition, logged through `tracing` by default
//!
//! ## Quick Start
//!
//! ```rust
//! use petclinic_suite::{Backoff, Failure, RetryPolicy, TrackingSleeper};
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Kind { Timeout, NotFound }
//!
//! let sleeper = TrackingSleeper::new();
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .backoff(Backoff::geometric(Duration::from_secs(1), 2.0).unwrap())
//!     .retry_on(Kind::Timeout)
//!     .with_sleeper(sleeper.clone())
//!     .build()
//!     .unwrap();
//!
//! let err = policy
//!     .execute(|| Err::<(), _>(Failure::new(Kind::NotFound, "no entry-url")))
//!     .unwrap_err();
//! assert!(err.is_fatal());
//! assert!(sleeper.calls().is_empty());
//! ```

pub mod backoff;
pub mod checks;
pub mod config;
pub mod environment;
pub mod error;
pub mod failure;
pub mod platform;
pub mod presets;
pub mod retry;
pub mod scenarios;
pub mod sleeper;
pub mod suite;
pub mod telemetry;

// Re-exports
pub use backoff::{Backoff, BackoffError};
pub use checks::{CheckKind, SiteProbe};
pub use config::{ConfigError, SuiteConfig};
pub use environment::{CloudImage, EnvironmentError, EnvironmentSpec, Policy};
pub use error::PollError;
pub use failure::{Failure, Outcome};
pub use platform::{
    ApplicationSummary, Instance, InstanceStatus, PlatformClient, PlatformError, PlatformInstance,
};
pub use retry::{BuildError, PollState, RetryPolicy, RetryPolicyBuilder};
pub use scenarios::{Scenario, SuiteContext, SuiteError};
pub use sleeper::{InstantSleeper, Sleeper, ThreadSleeper, TrackingSleeper};
pub use suite::{EnvironmentReport, ScenarioOutcome, Suite, SuiteReport};
