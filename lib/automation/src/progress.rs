//! Throttled progress reporting.
//!
//! The engine reports its traversal snapshot after every node. Writing each
//! snapshot straight to the state store would amplify one execution into
//! per-node writes, so callers wrap their sink in a [`ProgressReporter`]:
//! at most one delivery per interval, with [`ProgressReporter::flush`]
//! bypassing the throttle for writes that must never be dropped (the
//! terminal and suspend transitions).

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::state::EngineState;

/// Receives traversal snapshots from the engine.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Called with the engine's current traversal state. Implementations
    /// typically persist the state and broadcast an update event.
    async fn progress(&self, state: &EngineState);
}

/// A sink that discards everything. The default for tests and for callers
/// that do not observe progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn progress(&self, _state: &EngineState) {}
}

/// Rate-limits deliveries to a [`ProgressSink`].
pub struct ProgressReporter<S> {
    sink: S,
    min_interval: Duration,
    last_delivery: Mutex<Option<Instant>>,
}

impl ProgressReporter<NoopSink> {
    /// A reporter that drops everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(NoopSink, Duration::from_secs(1))
    }
}

impl<S: ProgressSink> ProgressReporter<S> {
    /// Creates a reporter delivering at most once per `min_interval`.
    #[must_use]
    pub fn new(sink: S, min_interval: Duration) -> Self {
        Self {
            sink,
            min_interval,
            last_delivery: Mutex::new(None),
        }
    }

    /// Delivers the snapshot unless a delivery happened within the
    /// interval. Dropped snapshots are simply superseded by later ones.
    pub async fn update(&self, state: &EngineState) {
        {
            let mut last = self.last_delivery.lock().await;
            match *last {
                Some(at) if at.elapsed() < self.min_interval => return,
                _ => *last = Some(Instant::now()),
            }
        }
        self.sink.progress(state).await;
    }

    /// Delivers unconditionally. Used for the final state transition,
    /// which is never throttled.
    pub async fn flush(&self, state: &EngineState) {
        {
            let mut last = self.last_delivery.lock().await;
            *last = Some(Instant::now());
        }
        self.sink.progress(state).await;
    }

    /// Returns the wrapped sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}
