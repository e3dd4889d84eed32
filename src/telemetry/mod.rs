//! Telemetry for poll sequences.
//!
//! Every terminal or waiting transition of the poller emits a [`PollEvent`] into an
//! [`EventSink`]. The default sink forwards events to `tracing`; tests collect them with
//! [`MemorySink`].

pub mod events;
pub mod sinks;

pub use events::{event_to_json, PollEvent};
pub use sinks::{EventSink, LogSink, MemorySink, NullSink};
