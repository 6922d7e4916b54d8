//! Progress reporting seam between the pipeline and its presentation
//!
//! Each stage of the pipeline (upload, processing, download) receives its
//! own [`ProgressSink`] and drives it with percentages in [0, 100]. The
//! pipeline is agnostic to how a sink renders — a terminal bar, a log line,
//! or nothing at all. Sinks are invoked synchronously on the orchestrating
//! task and must be non-blocking; they drive presentation, never
//! correctness.

use std::sync::Mutex;

/// A single-method capability for receiving progress updates
pub trait ProgressSink: Send + Sync {
    /// Report the current percentage, in [0, 100]
    fn set(&self, percent: f32);
}

/// A sink that discards all updates
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn set(&self, _percent: f32) {}
}

/// A sink that records every update it receives, for tests and auditing
#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<f32>>,
}

impl RecordingSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All percentages received so far, in arrival order
    pub fn samples(&self) -> Vec<f32> {
        match self.samples.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The most recent percentage, if any update arrived
    pub fn last(&self) -> Option<f32> {
        self.samples().last().copied()
    }
}

impl ProgressSink for RecordingSink {
    fn set(&self, percent: f32) {
        if let Ok(mut guard) = self.samples.lock() {
            guard.push(percent);
        }
    }
}

/// Internal wrapper enforcing the per-stage progress contract: values are
/// clamped to [0, 100] and never decrease. Each stage starts a fresh
/// wrapper, so streams reset to 0 at stage boundaries.
pub(crate) struct MonotonicProgress<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<f32>,
}

impl<'a> MonotonicProgress<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: Mutex::new(0.0),
        }
    }

    pub(crate) fn set(&self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if percent >= *last {
            *last = percent;
            self.sink.set(percent);
        }
    }

    /// Drive the stage to its logical end
    pub(crate) fn finish(&self) {
        self.set(100.0);
    }
}
