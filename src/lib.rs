//! Adaptive network speed measurement.
//!
//! Each measurement feeds instantaneous samples into a running-average
//! [`SampleCollector`] and stops as soon as the average is stable, the
//! transfer finishes, or a time bound is reached, whichever happens first.

pub mod collector;
pub mod config;
pub mod errors;
pub mod measurements;
pub mod payload;
pub mod progress;
pub mod results;
pub mod retry;
pub mod session;
pub mod transport;

pub use collector::SampleCollector;
pub use config::{SamplingConfig, SpeedTestConfig};
pub use errors::{ErrorKind, SpeedTestError};
pub use payload::{PayloadGenerator, RandomPayload};
pub use progress::{ProgressCallback, ProgressEvent};
pub use results::{Measurement, MeasurementKind, SpeedTestResults, StopReason};
pub use speed_test::SpeedTest;
pub use transport::client::HttpTransport;
pub use transport::{Transport, TransportEvent, TransportHandle};
