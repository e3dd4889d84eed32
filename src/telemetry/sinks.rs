use super::events::PollEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A telemetry sink that consumes poll events.
///
/// Emission is synchronous and infallible; a sink that can fail must swallow its own errors.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn emit(&self, event: &PollEvent);
}

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &PollEvent) {}
}

/// A telemetry sink that logs events using the `tracing` crate.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &PollEvent) {
        match event {
            PollEvent::Retrying { attempt, kind, delay } => {
                tracing::debug!(attempt, kind = %kind, delay = ?delay, "poll_retrying");
            }
            PollEvent::Succeeded { attempts, waited } => {
                tracing::debug!(attempts, waited = ?waited, "poll_succeeded");
            }
            PollEvent::Fatal { attempt, kind } => {
                tracing::warn!(attempt, kind = %kind, "poll_fatal");
            }
            PollEvent::Exhausted { attempts, kind, waited } => {
                tracing::warn!(attempts, kind = %kind, waited = ?waited, "poll_exhausted");
            }
        }
    }
}

/// A telemetry sink that stores events in memory.
///
/// Bounded: once `capacity` events are held, the oldest one is evicted for each new event.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<VecDeque<PollEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<PollEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<PollEvent> {
        self.guard().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &PollEvent) {
        let mut guard = self.guard();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(event.clone());
    }
}
