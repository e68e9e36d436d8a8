//! Progress event types and callback interface.
//!
//! Sessions report what they sample to an optional observer so a UI can
//! show live numbers. Observers never influence sampling.

use crate::results::{MeasurementKind, StopReason};

/// Progress events emitted while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The session issued its first request.
    Started { kind: MeasurementKind },
    /// One sample was fed to the collector.
    Sample {
        kind: MeasurementKind,
        /// The sample itself (bit/s or ms)
        value: f64,
        /// Running estimate after the sample
        estimate: f64,
        /// Samples collected so far
        samples: u64,
    },
    /// The session resolved with an estimate.
    Finished { kind: MeasurementKind, estimate: f64, reason: StopReason },
    /// The session failed.
    Failed { kind: MeasurementKind, message: String },
}

impl ProgressEvent {
    pub fn kind(&self) -> MeasurementKind {
        match self {
            ProgressEvent::Started { kind }
            | ProgressEvent::Sample { kind, .. }
            | ProgressEvent::Finished { kind, .. }
            | ProgressEvent::Failed { kind, .. } => *kind,
        }
    }
}

/// Callback interface for progress updates.
///
/// Implementations must be non-blocking to avoid affecting
/// measurement accuracy.
pub trait ProgressCallback: Send + Sync {
    /// Called when a progress event occurs.
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}
