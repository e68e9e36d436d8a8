//! The transport seam between measurement sessions and the network.
//!
//! A [`Transport`] opens one request and hands back a [`TransportHandle`]
//! that delivers lifecycle events in order: `Connected` once, zero or more
//! `Progress` notifications, then exactly one of `Complete` or `Error`.

pub mod client;
#[cfg(test)]
pub(crate) mod scripted;

use crate::measurements::ProgressSample;
use bytes::Bytes;
use http::Method;
use log::trace;
use std::error::Error;
use tokio::sync::mpsc;
use url::Url;

/// Lifecycle events emitted by a transport for a single request.
#[derive(Debug)]
pub enum TransportEvent {
    /// The request was opened; fired once before any data moves.
    Connected,
    /// Cumulative bytes transferred so far.
    Progress(ProgressSample),
    /// All bytes were transferred.
    Complete,
    /// The request failed.
    Error(Box<dyn Error + Send + Sync>),
}

impl TransportEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Complete | TransportEvent::Error(_))
    }
}

/// A request to be issued by a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Bytes>,
}

impl TransportRequest {
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, body: None }
    }

    pub fn post(url: Url, body: Bytes) -> Self {
        Self { method: Method::POST, url, body: Some(body) }
    }
}

/// Issues requests and reports their progress.
pub trait Transport: Send + Sync {
    /// Begin `request`. Events are delivered through the returned handle.
    fn open(&self, request: TransportRequest) -> TransportHandle;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        (**self).open(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        (**self).open(request)
    }
}

/// Stops an in-flight request. Must be safe to call after completion.
pub trait Abort: Send {
    fn abort(&mut self);
}

impl Abort for tokio::task::AbortHandle {
    fn abort(&mut self) {
        tokio::task::AbortHandle::abort(self)
    }
}

/// Receiving end of one open request.
///
/// Dropping a handle that never saw a terminal event aborts the request,
/// so a session that is itself dropped leaves nothing running.
pub struct TransportHandle {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    aborter: Box<dyn Abort>,
    settled: bool,
    released: bool,
}

impl TransportHandle {
    pub fn new(
        events: mpsc::UnboundedReceiver<TransportEvent>,
        aborter: impl Abort + 'static,
    ) -> Self {
        Self {
            events,
            aborter: Box::new(aborter),
            settled: false,
            released: false,
        }
    }

    /// Wait for the next event. `None` means the transport went away
    /// without reporting a terminal event.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.recv().await;
        if let Some(ref event) = event {
            self.settled |= event.is_terminal();
        }
        event
    }

    /// Whether a terminal event has been received.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Unsubscribe from further events and abort the request.
    pub fn release(mut self) {
        self.events.close();
        self.aborter.abort();
        self.released = true;
        trace!("transport handle released");
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if !self.released && !self.settled {
            self.aborter.abort();
        }
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("settled", &self.settled)
            .field("released", &self.released)
            .finish()
    }
}

/// Append a random query parameter so no intermediary serves a cached body.
pub fn cache_busted(url: &Url) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .append_pair("r", &rand::random::<u64>().to_string());
    url
}
