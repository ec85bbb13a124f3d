//! Controllable transport for testing.
//!
//! [`MockTransport`] answers requests from a handler function or a scripted
//! sequence, optionally after a simulated latency, and records every request
//! it sees. It is used by this crate's own tests and is public so that
//! applications can test their resource wiring without real I/O.
//!
//! # Example
//!
//! ```
//! use larder::transport::mock::MockTransport;
//!
//! let transport = MockTransport::ok("hello");
//! assert_eq!(transport.calls(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::error::TransportError;
use crate::request::{Request, Response};

type Handler = Arc<dyn Fn(&Request) -> Result<Response, TransportError> + Send + Sync>;

/// A transport that answers from a script instead of the network.
///
/// Clones share the handler, the call counter, and the recorded requests.
#[derive(Clone)]
pub struct MockTransport {
    handler: Handler,
    latency: Option<Duration>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Request>>>,
}

impl MockTransport {
    /// Creates a transport backed by `handler`.
    #[must_use]
    pub fn new(
        handler: impl Fn(&Request) -> Result<Response, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            latency: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answers `200 OK` with the given body.
    #[must_use]
    pub fn ok(body: &'static str) -> Self {
        Self::new(move |_| Ok(Response::ok(body)))
    }

    /// Always fails with the given error.
    #[must_use]
    pub fn failing(error: TransportError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Answers from a fixed sequence, one result per call. Calls past the
    /// end of the script fail with a connection error.
    #[must_use]
    pub fn sequence(script: Vec<Result<Response, TransportError>>) -> Self {
        let script = Mutex::new(script.into_iter().collect::<std::collections::VecDeque<_>>());
        Self::new(move |_| {
            script
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("script exhausted".into())))
        })
    }

    /// Adds a simulated latency before each answer. A cancellation during
    /// the delay resolves with [`TransportError::Aborted`].
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request seen so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Response, TransportError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.clone());

        let result = (self.handler)(&request);
        let latency = self.latency;
        async move {
            if let Some(latency) = latency {
                tokio::select! {
                    () = cancel.cancelled() => return Err(TransportError::Aborted),
                    () = tokio::time::sleep(latency) => {}
                }
            }
            result
        }
        .boxed()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("latency", &self.latency)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}
