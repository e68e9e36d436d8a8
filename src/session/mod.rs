//! Measurement sessions.
//!
//! A session owns one collector, at most one open transport handle, and a
//! single duration timer. It moves through
//! `Idle -> InFlight -> {Completed | Failed | TimedOut}` and only the first
//! terminal transition has any effect: that transition clears the timer,
//! releases the handle (closing its event stream and aborting the request),
//! and produces the session's one result.

pub mod ping;
pub mod throughput;

pub use ping::PingSession;
pub use throughput::ThroughputSession;

use crate::collector::SampleCollector;
use crate::config::SamplingConfig;
use crate::errors::{ErrorKind, SpeedTestError};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::results::{Measurement, MeasurementKind, StopReason};
use crate::transport::{TransportEvent, TransportHandle};
use log::{debug, info, warn};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// Lifecycle of a measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    InFlight,
    Completed,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Failed
                | SessionState::TimedOut
        )
    }

    /// Move to `next` if the transition is legal, returning whether it was
    /// applied. Terminal states are final.
    pub fn transition(&mut self, next: SessionState) -> bool {
        let allowed = match (*self, next) {
            (SessionState::Idle, SessionState::InFlight) => true,
            (SessionState::InFlight, SessionState::InFlight) => true,
            (SessionState::Idle | SessionState::InFlight, next) => {
                next.is_terminal()
            }
            _ => false,
        };

        if allowed {
            *self = next;
        }

        allowed
    }
}

/// The first terminal condition a session observed.
#[derive(Debug)]
pub(crate) enum Termination {
    Stable,
    Completed,
    TimedOut,
    Failed(SpeedTestError),
}

impl Termination {
    fn state(&self) -> SessionState {
        match self {
            Termination::Stable | Termination::Completed => {
                SessionState::Completed
            }
            Termination::TimedOut => SessionState::TimedOut,
            Termination::Failed(_) => SessionState::Failed,
        }
    }
}

/// What woke the session up.
#[derive(Debug)]
pub(crate) enum Signal {
    Event(TransportEvent),
    /// The transport dropped its end without a terminal event.
    Closed,
    Deadline,
}

/// State shared by the throughput and ping sessions.
pub(crate) struct Session {
    kind: MeasurementKind,
    state: SessionState,
    collector: SampleCollector,
    max_duration: Duration,
    started_at: Option<Instant>,
    deadline: Option<Pin<Box<Sleep>>>,
    handle: Option<TransportHandle>,
    observer: Option<Arc<dyn ProgressCallback>>,
}

impl Session {
    pub(crate) fn new(
        kind: MeasurementKind,
        sampling: &SamplingConfig,
        max_duration: Duration,
    ) -> Self {
        Self {
            kind,
            state: SessionState::Idle,
            collector: SampleCollector::new(sampling),
            max_duration,
            started_at: None,
            deadline: None,
            handle: None,
            observer: None,
        }
    }

    pub(crate) fn set_observer(
        &mut self,
        observer: Option<Arc<dyn ProgressCallback>>,
    ) {
        self.observer = observer;
    }

    pub(crate) fn kind(&self) -> MeasurementKind {
        self.kind
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Take ownership of a freshly opened request. A previous, settled
    /// handle is dropped without being aborted.
    pub(crate) fn attach(&mut self, handle: TransportHandle) {
        if self.state == SessionState::Idle {
            info!("Beginning {} measurement", self.kind);
            self.notify(ProgressEvent::Started { kind: self.kind });
        }

        self.state.transition(SessionState::InFlight);
        self.handle = Some(handle);
    }

    /// Record the first connection/progress instant; later calls are no-ops.
    pub(crate) fn mark_started(&mut self, at: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
    }

    /// Arm the duration timer. The timer is armed at most once.
    pub(crate) fn arm_timer(&mut self) {
        if self.deadline.is_none() && !self.state.is_terminal() {
            debug!(
                "{}: arming {:?} time limit",
                self.kind, self.max_duration
            );
            self.deadline = Some(Box::pin(sleep(self.max_duration)));
        }
    }

    /// Wait for the next transport event or the deadline, whichever is
    /// first. The deadline wins ties.
    pub(crate) async fn next_signal(&mut self) -> Signal {
        let Some(handle) = self.handle.as_mut() else {
            return Signal::Closed;
        };

        let event = match self.deadline.as_mut() {
            Some(deadline) => tokio::select! {
                biased;
                _ = deadline.as_mut() => return Signal::Deadline,
                event = handle.next_event() => event,
            },
            None => handle.next_event().await,
        };

        match event {
            Some(event) => Signal::Event(event),
            None => Signal::Closed,
        }
    }

    /// Feed one sample to the collector, returning whether sampling may
    /// stop.
    pub(crate) fn record(&mut self, value: f64) -> bool {
        let stop = self.collector.collect(value);
        let estimate = self.collector.estimate();
        let samples = self.collector.sample_count();

        debug!(
            "{} sample {}: {:.3} {} (estimate {:.3}, streak {})",
            self.kind,
            samples,
            value,
            self.kind.unit(),
            estimate,
            self.collector.stable_streak()
        );

        self.notify(ProgressEvent::Sample {
            kind: self.kind,
            value,
            estimate,
            samples,
        });

        stop
    }

    /// Error for a transport cause, tagged with the session kind.
    pub(crate) fn transport_error(
        &self,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) -> SpeedTestError {
        SpeedTestError::from_transport(cause, &format!("{} request", self.kind))
    }

    /// Apply the first terminal transition.
    ///
    /// The timer is cleared before anything else so it cannot fire after
    /// cleanup; the handle is released on every path, success included.
    pub(crate) fn finish(
        &mut self,
        end: Termination,
    ) -> Result<Measurement, SpeedTestError> {
        self.deadline = None;

        if let Some(handle) = self.handle.take() {
            handle.release();
        }

        if !self.state.transition(end.state()) {
            return Err(SpeedTestError::new(
                ErrorKind::Unknown,
                format!("{} session already finished", self.kind),
            ));
        }

        let reason = match end {
            Termination::Failed(error) => {
                warn!("{} measurement failed: {}", self.kind, error.message);
                self.notify(ProgressEvent::Failed {
                    kind: self.kind,
                    message: error.message.clone(),
                });
                return Err(error);
            }
            Termination::Stable => StopReason::Stable,
            Termination::Completed => StopReason::Completed,
            Termination::TimedOut => StopReason::TimedOut,
        };

        let elapsed = self
            .started_at
            .map(|started| Instant::now().saturating_duration_since(started))
            .unwrap_or_default();

        let measurement = Measurement::new(
            self.kind,
            self.collector.estimate(),
            self.collector.sample_count(),
            reason,
            elapsed,
        );

        info!(
            "{} measurement finished ({}): {} from {} samples",
            self.kind,
            reason.description(),
            measurement.display_value(),
            measurement.samples
        );

        self.notify(ProgressEvent::Finished {
            kind: self.kind,
            estimate: measurement.estimate,
            reason,
        });

        Ok(measurement)
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(ref observer) = self.observer {
            observer.on_progress(event);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            debug!("{} session dropped before finishing", self.kind);
        }
    }
}
