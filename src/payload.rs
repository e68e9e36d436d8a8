//! Upload payload generation.

use crate::errors::SpeedTestError;
use bytes::Bytes;
use futures::future::BoxFuture;
use log::debug;
use rand::RngCore;

/// Produces the body an upload session sends.
pub trait PayloadGenerator: Send + Sync {
    /// Build a buffer of exactly `size` bytes.
    fn generate(
        &self,
        size: usize,
    ) -> BoxFuture<'_, Result<Bytes, SpeedTestError>>;
}

/// Non-cryptographic random bytes, so no intermediary can compress the
/// upload and inflate the measured speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPayload;

impl PayloadGenerator for RandomPayload {
    fn generate(
        &self,
        size: usize,
    ) -> BoxFuture<'_, Result<Bytes, SpeedTestError>> {
        Box::pin(async move {
            // Filling tens of MiB takes long enough to stall the runtime.
            let data = tokio::task::spawn_blocking(move || {
                let mut data = vec![0u8; size];
                rand::thread_rng().fill_bytes(&mut data);
                data
            })
            .await
            .map_err(|e| {
                SpeedTestError::payload("failed to generate upload payload")
                    .with_source(e)
            })?;

            debug!("Generated {} byte upload payload", data.len());
            Ok(Bytes::from(data))
        })
    }
}
