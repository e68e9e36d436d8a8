//! Download and upload sessions.
//!
//! One request per session. Speed samples come from the difference between
//! consecutive cumulative byte counts; the session stops as soon as the
//! collector reports a stable estimate, the transfer completes, the transport
//! fails, or the duration bound is hit.

use crate::config::SpeedTestConfig;
use crate::errors::SpeedTestError;
use crate::measurements::DeltaTracker;
use crate::progress::ProgressCallback;
use crate::results::{Measurement, MeasurementKind};
use crate::session::{Session, Signal, Termination};
use crate::transport::{
    cache_busted, Transport, TransportEvent, TransportRequest,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::time::Instant;

pub struct ThroughputSession<T> {
    session: Session,
    transport: T,
    request: TransportRequest,
    ceiling_bps: f64,
}

impl<T: Transport> ThroughputSession<T> {
    /// A GET against the (cache-busted) download endpoint.
    pub fn download(transport: T, config: &SpeedTestConfig) -> Self {
        let url = cache_busted(&config.download_url);
        let kind = MeasurementKind::Download;
        Self::with_request(kind, transport, config, TransportRequest::get(url))
    }

    /// A POST of `payload` to the upload endpoint.
    pub fn upload(
        transport: T,
        config: &SpeedTestConfig,
        payload: Bytes,
    ) -> Self {
        let url = config.upload_url.clone();
        let request = TransportRequest::post(url, payload);
        Self::with_request(MeasurementKind::Upload, transport, config, request)
    }

    fn with_request(
        kind: MeasurementKind,
        transport: T,
        config: &SpeedTestConfig,
        request: TransportRequest,
    ) -> Self {
        Self {
            session: Session::new(
                kind,
                &config.sampling,
                config.max_test_duration,
            ),
            transport,
            request,
            ceiling_bps: config.speed_ceiling_bps,
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

    pub fn kind(&self) -> MeasurementKind {
        self.session.kind()
    }

    /// Drive the request to its first terminal condition.
    ///
    /// Hitting the duration bound is a successful outcome carrying the
    /// estimate accumulated so far; only transport failures are errors.
    pub async fn run(mut self) -> Result<Measurement, SpeedTestError> {
        let handle = self.transport.open(self.request.clone());
        self.session.attach(handle);

        let mut tracker = DeltaTracker::new();

        let end = loop {
            match self.session.next_signal().await {
                Signal::Deadline => break Termination::TimedOut,
                Signal::Closed => {
                    break Termination::Failed(SpeedTestError::transport(
                        format!(
                            "{} request ended without completing",
                            self.session.kind()
                        ),
                    ));
                }
                Signal::Event(TransportEvent::Connected) => {
                    self.session.mark_started(Instant::now());
                    self.session.arm_timer();
                }
                Signal::Event(TransportEvent::Progress(sample)) => {
                    self.session.mark_started(sample.at);

                    let (next, rate) = tracker.track(sample, self.ceiling_bps);
                    tracker = next;

                    if let Some(rate) = rate {
                        if self.session.record(rate) {
                            break Termination::Stable;
                        }
                    }
                }
                Signal::Event(TransportEvent::Complete) => {
                    break Termination::Completed;
                }
                Signal::Event(TransportEvent::Error(cause)) => {
                    break Termination::Failed(
                        self.session.transport_error(cause),
                    );
                }
            }
        };

        self.session.finish(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::{to_mbps, BITS_PER_MEGABIT};
    use crate::progress::testing::Recorder;
    use crate::progress::ProgressEvent;
    use crate::results::StopReason;
    use crate::transport::scripted::{Script, ScriptedTransport, Step};
    use std::time::Duration;

    fn config() -> SpeedTestConfig {
        SpeedTestConfig::from_urls(
            "https://example.com/down",
            "https://example.com/up",
            "https://example.com/ping",
        )
        .unwrap()
    }

    fn mib_per_second(seconds: u64) -> Vec<u64> {
        (0..=seconds).map(|i| i * 131_072).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_one_megabit_per_second() {
        let transport = ScriptedTransport::single(
            Script::progress_every_second(&[0, 131_072, 262_144, 393_216])
                .at_secs(3.0, Step::Complete),
        );
        let recorder = Arc::new(Recorder::default());

        let measurement =
            ThroughputSession::download(transport.clone(), &config())
                .with_progress(recorder.clone())
                .run()
                .await
                .unwrap();

        assert_eq!(measurement.samples, 3);
        assert_eq!(measurement.stop_reason, StopReason::Completed);
        assert!((to_mbps(measurement.estimate) - 1.0).abs() < 1e-9);
        assert_eq!(measurement.elapsed, Duration::from_secs(3));

        let samples = recorder.samples();
        assert_eq!(samples.len(), 3);
        for sample in samples {
            assert!((sample - BITS_PER_MEGABIT).abs() < 1e-6);
        }

        assert_eq!(transport.aborts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_stops_once_stable() {
        let transport = ScriptedTransport::single(
            Script::progress_every_second(&mib_per_second(20))
                .at_secs(20.0, Step::Complete),
        );
        let config = config().with_max_test_duration(Duration::from_secs(60));

        let started = Instant::now();
        let measurement =
            ThroughputSession::download(transport.clone(), &config)
                .run()
                .await
                .unwrap();

        // Seed at 0s, first sample at 1s, five stable comparisons after it.
        assert_eq!(measurement.stop_reason, StopReason::Stable);
        assert_eq!(measurement.samples, 6);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(transport.aborts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_before_progress_fails_and_aborts_once() {
        let transport = ScriptedTransport::single(
            Script::new()
                .at(Duration::ZERO, Step::Connected)
                .at_secs(0.5, Step::Error("connection reset by peer")),
        );
        let recorder = Arc::new(Recorder::default());

        let error = ThroughputSession::download(transport.clone(), &config())
            .with_progress(recorder.clone())
            .run()
            .await
            .unwrap_err();

        assert!(error.is_transport());
        assert!(error.message.contains("connection reset by peer"));
        assert_eq!(transport.aborts(), 1);
        assert_eq!(recorder.finished_count(), 1);
        assert!(matches!(
            recorder.events().last(),
            Some(ProgressEvent::Failed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_with_current_estimate() {
        // 1 Mbit/s and 4 Mbit/s alternate, so the average never settles.
        let mut loaded = 0;
        let mut progress = vec![0];
        for i in 0..40 {
            loaded += if i % 2 == 0 { 131_072 } else { 524_288 };
            progress.push(loaded);
        }

        let transport = ScriptedTransport::single(
            Script::progress_every_second(&progress)
                .at_secs(60.0, Step::Complete),
        );
        let recorder = Arc::new(Recorder::default());

        let measurement =
            ThroughputSession::download(transport.clone(), &config())
                .with_progress(recorder.clone())
                .run()
                .await
                .unwrap();

        assert_eq!(measurement.stop_reason, StopReason::TimedOut);
        assert_eq!(measurement.elapsed, Duration::from_secs(10));
        assert!(measurement.estimate > 0.0);

        // Nothing fires after the session resolved.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.aborts(), 1);
        assert_eq!(recorder.finished_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_is_armed_on_connect() {
        // Connects two seconds in; the bound is measured from there.
        let transport = ScriptedTransport::single(
            Script::new()
                .at_secs(2.0, Step::Connected)
                .at_secs(60.0, Step::Complete),
        );

        let started = Instant::now();
        let measurement =
            ThroughputSession::download(transport.clone(), &config())
                .run()
                .await
                .unwrap();

        assert_eq!(measurement.stop_reason, StopReason::TimedOut);
        assert_eq!(measurement.samples, 0);
        assert_eq!(measurement.estimate, 0.0);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_time_delta_uses_ceiling() {
        let transport = ScriptedTransport::single(
            Script::new()
                .at(Duration::ZERO, Step::Connected)
                .at(Duration::ZERO, Step::Progress(1_000))
                .at(Duration::ZERO, Step::Progress(2_000))
                .at_secs(1.0, Step::Progress(2_000 + 131_072))
                .at_secs(1.0, Step::Complete),
        );
        let config = config().with_speed_ceiling_bps(100.0 * BITS_PER_MEGABIT);
        let recorder = Arc::new(Recorder::default());

        let measurement = ThroughputSession::download(transport, &config)
            .with_progress(recorder.clone())
            .run()
            .await
            .unwrap();

        let samples = recorder.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], 100.0 * BITS_PER_MEGABIT);
        assert!((samples[1] - BITS_PER_MEGABIT).abs() < 1e-6);

        // (100 + 1) / 2 Mbit/s
        assert!(measurement.estimate.is_finite());
        assert!((to_mbps(measurement.estimate) - 50.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_vanishing_is_an_error() {
        let transport = ScriptedTransport::single(
            Script::new()
                .at(Duration::ZERO, Step::Connected)
                .at_secs(1.0, Step::Progress(0)),
        );

        let error = ThroughputSession::download(transport.clone(), &config())
            .run()
            .await
            .unwrap_err();

        assert!(error.is_transport());
        assert!(error.message.contains("without completing"));
        assert_eq!(transport.aborts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_url_is_cache_busted() {
        let transport = ScriptedTransport::single(
            Script::progress_every_second(&[0]).at_secs(0.0, Step::Complete),
        );

        ThroughputSession::download(transport.clone(), &config())
            .run()
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, http::Method::GET);
        assert_eq!(requests[0].url.path(), "/down");
        assert!(requests[0].url.query().unwrap().starts_with("r="));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_posts_payload() {
        let transport = ScriptedTransport::single(
            Script::progress_every_second(&[0, 131_072, 262_144])
                .at_secs(2.0, Step::Complete),
        );
        let payload = Bytes::from(vec![0u8; 262_144]);

        let measurement =
            ThroughputSession::upload(transport.clone(), &config(), payload)
                .run()
                .await
                .unwrap();

        assert_eq!(measurement.kind, MeasurementKind::Upload);
        assert_eq!(measurement.samples, 2);

        let requests = transport.requests();
        assert_eq!(requests[0].method, http::Method::POST);
        assert_eq!(requests[0].body_len, Some(262_144));
        assert_eq!(requests[0].url.as_str(), "https://example.com/up");
    }
}
