//! `reqwest`-backed transport.
//!
//! Each request runs on its own tokio task; progress is reported per body
//! chunk, from the response stream for downloads and from the request body
//! stream for uploads.

use crate::errors::SpeedTestError;
use crate::measurements::ProgressSample;
use crate::transport::{
    Transport, TransportEvent, TransportHandle, TransportRequest,
};
use bytes::Bytes;
use futures::{stream, StreamExt};
use log::{debug, warn};
use reqwest::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE,
    USER_AGENT,
};
use reqwest::{Body, Client as ReqwestClient};
use std::error::Error;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;

const UA: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_REPOSITORY"),
    ")"
);

/// Size of the chunks an upload body is handed to the connection in.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP transport built on a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self, SpeedTestError> {
        let client = ReqwestClient::builder()
            .default_headers(default_headers())
            .build()
            .map_err(|e| {
                SpeedTestError::config("failed to build HTTP client")
                    .with_source(e)
            })?;

        Ok(Self { client })
    }

    /// Use an already configured client (proxies, timeouts, TLS roots...).
    pub fn with_client(client: ReqwestClient) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();

        let task = tokio::spawn(async move {
            let method = request.method.clone();
            let url = request.url.clone();

            let event = match execute(client, request, &tx).await {
                Ok(()) => TransportEvent::Complete,
                Err(e) => {
                    warn!("{} {} failed: {}", method, url, e);
                    TransportEvent::Error(e)
                }
            };

            let _ = tx.send(event);
        });

        TransportHandle::new(rx, task.abort_handle())
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(UA));

    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    headers
}

async fn execute(
    client: ReqwestClient,
    request: TransportRequest,
    events: &UnboundedSender<TransportEvent>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let TransportRequest { method, url, body } = request;
    debug!("Opening {} {}", method, url);

    let mut builder = client.request(method, url);
    let is_upload = body.is_some();

    if let Some(body) = body {
        builder = builder
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, body.len())
            .body(progress_body(body, events.clone()));
    }

    let _ = events.send(TransportEvent::Connected);

    let response = builder.send().await?.error_for_status()?;

    if is_upload {
        // Upload progress was reported while sending; just drain the reply.
        response.bytes().await?;
        return Ok(());
    }

    let mut loaded: u64 = 0;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        loaded += chunk?.len() as u64;
        let sample = ProgressSample::new(loaded, Instant::now());
        let _ = events.send(TransportEvent::Progress(sample));
    }

    Ok(())
}

/// Wrap an upload payload in a stream that reports cumulative progress as
/// each chunk is handed to the connection.
fn progress_body(
    payload: Bytes,
    events: UnboundedSender<TransportEvent>,
) -> Body {
    let mut loaded: u64 = 0;

    let chunks = stream::iter(split_chunks(payload, UPLOAD_CHUNK_SIZE)).map(
        move |chunk| {
            loaded += chunk.len() as u64;
            let sample = ProgressSample::new(loaded, Instant::now());
            let _ = events.send(TransportEvent::Progress(sample));
            Ok::<_, std::io::Error>(chunk)
        },
    );

    Body::wrap_stream(chunks)
}

fn split_chunks(payload: Bytes, chunk_size: usize) -> Vec<Bytes> {
    (0..payload.len())
        .step_by(chunk_size)
        .map(|start| {
            payload.slice(start..(start + chunk_size).min(payload.len()))
        })
        .collect()
}
