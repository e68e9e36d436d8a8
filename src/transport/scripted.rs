//! Test transport that replays scripted events at virtual times.
//!
//! Meant for `#[tokio::test(start_paused = true)]`: each step sleeps until
//! its offset from the moment the request was opened, then emits its event
//! stamped with the (virtual) current instant.

use crate::measurements::ProgressSample;
use crate::transport::{
    Abort, Transport, TransportEvent, TransportHandle, TransportRequest,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub(crate) enum Step {
    Connected,
    Progress(u64),
    Complete,
    Error(&'static str),
    /// An error whose cause sits in its `source()` chain, outermost first.
    ErrorChain(&'static [&'static str]),
}

/// Error with a nested cause, the shape HTTP clients report failures in.
#[derive(Debug)]
pub(crate) struct LayeredError {
    message: &'static str,
    source: Option<Box<LayeredError>>,
}

impl LayeredError {
    pub(crate) fn chain(messages: &[&'static str]) -> Self {
        let (last, outer) = messages.split_last().expect("empty chain");
        outer.iter().rev().fold(
            Self { message: *last, source: None },
            |inner, &message| Self {
                message,
                source: Some(Box::new(inner)),
            },
        )
    }
}

impl std::fmt::Display for LayeredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for LayeredError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Events for one request, as `(offset from open, step)` pairs.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    steps: Vec<(Duration, Step)>,
}

impl Script {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn at(mut self, offset: Duration, step: Step) -> Self {
        self.steps.push((offset, step));
        self
    }

    pub(crate) fn at_secs(self, secs: f64, step: Step) -> Self {
        self.at(Duration::from_secs_f64(secs), step)
    }

    /// A round trip that connects immediately and completes after `rtt`.
    pub(crate) fn round_trip(rtt: Duration) -> Self {
        Self::new()
            .at(Duration::ZERO, Step::Connected)
            .at(rtt, Step::Complete)
    }

    /// Connected at zero, then `loaded` bytes at one-second intervals.
    pub(crate) fn progress_every_second(loaded: &[u64]) -> Self {
        loaded.iter().enumerate().fold(
            Self::new().at(Duration::ZERO, Step::Connected),
            |script, (i, &bytes)| {
                script.at_secs(i as f64, Step::Progress(bytes))
            },
        )
    }
}

/// What the transport was asked to do.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) method: http::Method,
    pub(crate) url: url::Url,
    pub(crate) body_len: Option<usize>,
}

/// Replays one script per opened request; the last script repeats once
/// the queue runs dry.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedTransport {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    last: Arc<Mutex<Option<Script>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    aborts: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            last: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
            aborts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn single(script: Script) -> Self {
        Self::new(vec![script])
    }

    pub(crate) fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self) -> Script {
        let next = self.scripts.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(script) => {
                *last = Some(script.clone());
                script
            }
            None => last.clone().unwrap_or_default(),
        }
    }
}

struct CountingAbort {
    task: tokio::task::AbortHandle,
    aborts: Arc<AtomicUsize>,
}

impl Abort for CountingAbort {
    fn abort(&mut self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.task.abort();
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            body_len: request.body.as_ref().map(|b| b.len()),
        });

        let script = self.next_script();
        let (tx, rx) = mpsc::unbounded_channel();
        let opened = Instant::now();

        let task = tokio::spawn(async move {
            for (offset, step) in script.steps {
                sleep_until(opened + offset).await;

                let event = match step {
                    Step::Connected => TransportEvent::Connected,
                    Step::Progress(loaded) => TransportEvent::Progress(
                        ProgressSample::new(loaded, Instant::now()),
                    ),
                    Step::Complete => TransportEvent::Complete,
                    Step::Error(message) => TransportEvent::Error(
                        Box::new(std::io::Error::other(message)),
                    ),
                    Step::ErrorChain(messages) => TransportEvent::Error(
                        Box::new(LayeredError::chain(messages)),
                    ),
                };

                if tx.send(event).is_err() {
                    return;
                }
            }
        });

        let aborter = CountingAbort {
            task: task.abort_handle(),
            aborts: self.aborts.clone(),
        };

        TransportHandle::new(rx, aborter)
    }
}
