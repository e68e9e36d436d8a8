//! Latency session: sequential small round trips against the ping endpoint.

use crate::config::SpeedTestConfig;
use crate::errors::SpeedTestError;
use crate::progress::ProgressCallback;
use crate::results::{Measurement, MeasurementKind};
use crate::session::{Session, Signal, Termination};
use crate::transport::{
    cache_busted, Transport, TransportEvent, TransportRequest,
};
use std::sync::Arc;
use tokio::time::Instant;
use url::Url;

pub struct PingSession<T> {
    session: Session,
    transport: T,
    url: Url,
}

impl<T: Transport> PingSession<T> {
    pub fn new(transport: T, config: &SpeedTestConfig) -> Self {
        Self {
            session: Session::new(
                MeasurementKind::Ping,
                &config.sampling,
                config.max_test_duration,
            ),
            transport,
            url: config.ping_url.clone(),
        }
    }

    /// Report samples and the outcome to `observer`.
    pub fn with_progress(
        mut self,
        observer: Arc<dyn ProgressCallback>,
    ) -> Self {
        self.session.set_observer(Some(observer));
        self
    }

    /// Issue round trips one at a time until the estimate is stable or the
    /// time limit is reached.
    ///
    /// Any failed round trip fails the whole session and the samples
    /// gathered so far are discarded.
    pub async fn run(mut self) -> Result<Measurement, SpeedTestError> {
        self.session.arm_timer();

        loop {
            if let Some(end) = self.round_trip().await {
                return self.session.finish(end);
            }

            tokio::task::yield_now().await;
        }
    }

    /// One request/response exchange. Returns the terminal condition if the
    /// session should stop.
    async fn round_trip(&mut self) -> Option<Termination> {
        let request = TransportRequest::get(cache_busted(&self.url));

        let started = Instant::now();
        let handle = self.transport.open(request);
        self.session.attach(handle);
        self.session.mark_started(started);

        loop {
            match self.session.next_signal().await {
                Signal::Deadline => return Some(Termination::TimedOut),
                Signal::Closed => {
                    return Some(Termination::Failed(
                        SpeedTestError::transport(
                            "ping request ended without completing",
                        ),
                    ));
                }
                Signal::Event(TransportEvent::Connected)
                | Signal::Event(TransportEvent::Progress(_)) => {}
                Signal::Event(TransportEvent::Complete) => {
                    let rtt = started.elapsed().as_secs_f64() * 1000.0;
                    return self
                        .session
                        .record(rtt)
                        .then_some(Termination::Stable);
                }
                Signal::Event(TransportEvent::Error(cause)) => {
                    return Some(Termination::Failed(
                        self.session.transport_error(cause),
                    ));
                }
            }
        }
    }
}
