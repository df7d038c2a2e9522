//! Progress reporting and cancellation primitives.
//!
//! The pipeline is observable through an injected [`ProgressSink`] and
//! interruptible through a shared [`CancelToken`]. Both are deliberately
//! tiny: one run, one observer, no fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::pipeline::{PipelinePhase, PipelineStep, StepStatus};

// ── Cancellation ───────────────────────────────────────────────────────

/// Cooperative cancellation flag.
///
/// Checked at every step boundary and immediately before each LLM call.
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ── Clock ──────────────────────────────────────────────────────────────

/// Monotonic elapsed-time source, injectable for tests.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was started.
    fn elapsed(&self) -> Duration;
}

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for MonotonicClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

// ── Progress sink ──────────────────────────────────────────────────────

/// Callback surface for embedders watching a run.
///
/// Callbacks are delivered in step-start order from the orchestrator's
/// single logical task; implementations should return quickly.
pub trait ProgressSink: Send + Sync {
    /// A step transitioned to `Running`.
    fn on_step_start(&self, step: PipelineStep, phase: PipelinePhase) {
        let _ = (step, phase);
    }

    /// A step reached a terminal status.
    fn on_step_complete(&self, step: PipelineStep, status: &StepStatus) {
        let _ = (step, status);
    }

    /// Overall progress after a step boundary.
    fn on_progress(&self, percent: f64, elapsed: Duration) {
        let _ = (percent, elapsed);
    }
}

/// Discards all progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}
