//! The resource orchestrator.
//!
//! A [`Resource`] is a managed, reactive binding between a request descriptor
//! and its fetched result. The descriptor comes in as a fixed value or a
//! live [`Cell`](crate::cell::Cell); whenever it changes (by the configured
//! equality), the previous attempt is superseded and a new lifecycle runs:
//!
//! 1. the shared cache is consulted (a fresh hit resolves without I/O, a
//!    stale hit resolves immediately *and* revalidates in the background),
//! 2. the circuit breaker, if configured, gates the network call,
//! 3. the call itself is deduplicated, retried per policy, reconciled with
//!    the response's `Cache-Control`, and stored,
//! 4. the outcome lands in an observable [`ResourceState`].
//!
//! All orchestration for one resource runs on a single driver task, so state
//! transitions never race with themselves. Results from a superseded attempt
//! are discarded, never applied out of order.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use larder::cell::Cell;
//! use larder::client::Client;
//! use larder::config::ResourceOptions;
//! use larder::request::Request;
//! use larder::resource::Resource;
//! use larder::transport::mock::MockTransport;
//!
//! # async fn example() {
//! let client = Arc::new(Client::new(MockTransport::ok("{\"name\":\"ada\"}")));
//!
//! let user_id = Cell::new(Some(Request::get("https://api.example.com/users/1")));
//! let user = Resource::new(Arc::clone(&client), user_id.clone(), ResourceOptions::new());
//!
//! // Changing the input supersedes the running request and refetches.
//! user_id.set(Some(Request::get("https://api.example.com/users/2")));
//!
//! // Setting it to None disables the resource entirely.
//! user_id.set(None);
//! # }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::future;
use futures::stream::{self, BoxStream};
use http::{HeaderMap, StatusCode};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::cache::{CacheEntry, CacheEvent, CacheEventKind};
use crate::cell::Input;
use crate::client::{Client, derive_key, with_conditionals};
use crate::config::{CacheOptions, ResourceOptions};
use crate::dedupe::Attempt;
use crate::error::FetchError;
use crate::request::{EqFn, Request, Response, default_eq};
use crate::retry::RetryPolicy;

/// Where a resource is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No request has been derived yet.
    #[default]
    Idle,
    /// The derived request is absent, or the circuit breaker is suppressing
    /// requests. Not an error.
    Disabled,
    /// An attempt is in flight and there is no usable value.
    Loading,
    /// The last attempt succeeded (or a cached value is being served).
    Resolved,
    /// The last attempt failed terminally.
    Error,
}

/// The observable state of a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceState {
    /// Lifecycle phase.
    pub phase: Phase,
    /// The current value (response body), if any.
    pub value: Option<Bytes>,
    /// The terminal error of the last attempt, if it failed.
    pub error: Option<FetchError>,
    /// Status code of the last response (or failed status).
    pub status_code: Option<StatusCode>,
    /// Headers of the last successful response.
    pub headers: Option<HeaderMap>,
}

impl ResourceState {
    /// Returns the value if one is available.
    #[must_use]
    pub const fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// Returns `true` before the first derivation.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Returns `true` while the resource is disabled or suppressed.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.phase == Phase::Disabled
    }

    /// Returns `true` while an attempt is in flight without a usable value.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    /// Returns `true` when a value is being served.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.phase == Phase::Resolved
    }

    /// Returns `true` after a terminal failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.phase == Phase::Error
    }
}

enum Cmd {
    Reload,
    Set(Bytes),
    Update(Box<dyn FnOnce(Option<Bytes>) -> Bytes + Send>),
    Restore(ResourceState),
}

/// A reactive binding between a request descriptor and its fetched result.
///
/// Dropping the resource (or calling [`destroy`](Self::destroy)) cancels the
/// driver task, detaches from any in-flight call, and clears all timers and
/// subscriptions.
pub struct Resource {
    client: Arc<Client>,
    cache_options: Option<CacheOptions>,
    input: Input<Option<Request>>,
    breaker: Option<Arc<CircuitBreaker>>,
    state_tx: Arc<watch::Sender<ResourceState>>,
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    destroy: CancellationToken,
}

impl Resource {
    /// Creates a resource and starts its driver task.
    ///
    /// Must be called within a tokio runtime. The input can be a fixed
    /// `Option<Request>` or a `Cell<Option<Request>>` that the application
    /// keeps writing to.
    #[must_use]
    pub fn new(
        client: Arc<Client>,
        input: impl Into<Input<Option<Request>>>,
        options: ResourceOptions,
    ) -> Self {
        let input = input.into();
        let cache_options = options.cache.resolve();
        let breaker = options.breaker.resolve();
        let eq = options.eq.clone().unwrap_or_else(default_eq);
        let (state_tx, _) = watch::channel(ResourceState::default());
        let state_tx = Arc::new(state_tx);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let destroy = CancellationToken::new();

        let driver = Driver {
            client: Arc::clone(&client),
            options: options.clone(),
            cache_options: cache_options.clone(),
            breaker: breaker.clone(),
            eq,
            state_tx: Arc::clone(&state_tx),
            current: None,
            key: None,
            generation: 0,
            breaker_held: false,
        };
        tokio::spawn(driver.run(input.clone(), cmd_rx, destroy.clone()));

        Self {
            client,
            cache_options,
            input,
            breaker,
            state_tx,
            cmd_tx,
            destroy,
        }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state_tx.borrow().clone()
    }

    /// The current value, if any.
    #[must_use]
    pub fn value(&self) -> Option<Bytes> {
        self.state_tx.borrow().value.clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
        self.state_tx.subscribe()
    }

    /// State changes as a stream.
    #[must_use]
    pub fn changes(&self) -> BoxStream<'static, ResourceState> {
        WatchStream::from_changes(self.state_tx.subscribe()).boxed()
    }

    /// The resource's circuit breaker, if one is configured.
    #[must_use]
    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Forces a refetch of the current request.
    ///
    /// An explicit reload also forces an open circuit breaker into
    /// half-open, bypassing its cooldown.
    pub fn reload(&self) {
        let _ = self.cmd_tx.send(Cmd::Reload);
    }

    /// Overwrites the current value without making a request. When caching
    /// is enabled this also writes through to the shared store.
    pub fn set(&self, value: impl Into<Bytes>) {
        let _ = self.cmd_tx.send(Cmd::Set(value.into()));
    }

    /// Derives a new value from the current one without making a request.
    pub fn update(&self, f: impl FnOnce(Option<Bytes>) -> Bytes + Send + 'static) {
        let _ = self.cmd_tx.send(Cmd::Update(Box::new(f)));
    }

    /// Warms the cache for the current request (or `override_request`)
    /// without touching this resource's state.
    ///
    /// A no-op when caching is off, when there is nothing to request, or
    /// while the client's bandwidth hint is set. Never fails.
    pub fn prefetch(&self, override_request: Option<Request>) {
        let Some(request) = override_request.or_else(|| self.input.get()) else {
            return;
        };
        let Some(options) = self.cache_options.clone() else {
            return;
        };
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            client.prefetch(request, &options).await;
        });
    }

    /// Tears down the driver task, timers, and subscriptions. Idempotent;
    /// also runs on drop.
    pub fn destroy(&self) {
        self.destroy.cancel();
    }

    pub(crate) fn snapshot(&self) -> ResourceState {
        self.state()
    }

    pub(crate) fn restore(&self, snapshot: ResourceState) {
        let _ = self.cmd_tx.send(Cmd::Restore(snapshot));
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        self.destroy.cancel();
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

struct InFlight {
    generation: u64,
    revalidation: bool,
    attempt: Attempt,
}

struct Driver {
    client: Arc<Client>,
    options: ResourceOptions,
    cache_options: Option<CacheOptions>,
    breaker: Option<Arc<CircuitBreaker>>,
    eq: EqFn,
    state_tx: Arc<watch::Sender<ResourceState>>,
    current: Option<Request>,
    key: Option<String>,
    generation: u64,
    breaker_held: bool,
}

impl Driver {
    async fn run(
        mut self,
        input: Input<Option<Request>>,
        mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
        destroy: CancellationToken,
    ) {
        let mut input_changes = input.changes();
        let mut cache_events = self
            .cache_options
            .as_ref()
            .map(|_| self.client.cache().subscribe());
        let mut breaker_changes = self.breaker.as_ref().map(|breaker| breaker.subscribe());
        let mut refresh = self.options.refresh.map(|every| {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        let mut attempt: Option<InFlight> = None;
        let mut gate: Option<Instant> = None;

        self.derive(input.get(), &mut attempt, &mut gate);

        loop {
            tokio::select! {
                () = destroy.cancelled() => break,
                next = input_changes.next() => match next {
                    Some(derived) => self.derive(derived, &mut attempt, &mut gate),
                    // The input cell is gone; the descriptor is final now.
                    None => input_changes = stream::pending().boxed(),
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd, &mut attempt, &mut gate),
                    None => break,
                },
                settled = next_settlement(&mut attempt) => {
                    self.on_settled(settled, &mut attempt);
                }
                event = next_cache_event(&mut cache_events) => {
                    self.on_cache_event(&event, &mut attempt, &mut gate);
                }
                state = next_breaker_state(&mut breaker_changes) => {
                    self.on_breaker_change(state, &mut attempt, &mut gate);
                }
                () = next_tick(&mut refresh) => {
                    if self.current.is_some() && attempt.is_none() {
                        self.start(&mut attempt, &mut gate, true);
                    }
                }
                () = gate_elapsed(&gate) => {
                    gate = None;
                    self.start(&mut attempt, &mut gate, false);
                }
            }
        }

        drop(attempt);
        self.release_breaker();
    }

    /// Applies a newly derived descriptor.
    fn derive(
        &mut self,
        derived: Option<Request>,
        attempt: &mut Option<InFlight>,
        gate: &mut Option<Instant>,
    ) {
        match derived {
            None => {
                self.current = None;
                self.key = None;
                self.generation += 1;
                self.drop_attempt(attempt);
                *gate = None;
                self.publish_vacant(Phase::Disabled);
            }
            Some(request) => {
                if self
                    .current
                    .as_ref()
                    .is_some_and(|current| (self.eq)(current, &request))
                {
                    return;
                }
                self.current = Some(request);
                self.start(attempt, gate, false);
            }
        }
    }

    /// Starts (or restarts) the lifecycle for the current descriptor.
    ///
    /// `force` skips the fresh-cache fast path, turning a fresh hit into a
    /// served value plus a background refetch (manual reloads, refresh
    /// ticks).
    fn start(&mut self, attempt: &mut Option<InFlight>, gate: &mut Option<Instant>, force: bool) {
        let Some(request) = self.current.clone() else {
            return;
        };
        self.generation += 1;
        self.drop_attempt(attempt);
        *gate = None;

        let key = match &self.cache_options {
            Some(options) => derive_key(&request, options),
            None => request.cache_key(),
        };
        self.key = Some(key.clone());

        // Cache fast path: serve what we have, decide whether to revalidate.
        let mut prior: Option<CacheEntry> = None;
        if self.cache_options.is_some() {
            if let Some(entry) = self.client.cache().get(&key) {
                let stale = entry.is_stale();
                self.apply_entry(&entry);
                if !stale && !force {
                    return;
                }
                prior = Some(entry);
            }
        }
        let revalidation = prior.is_some();

        // Breaker gate. With a last-known-good value on display the
        // suppression is invisible; without one the resource reports
        // disabled. Either way no retry budget is consumed.
        if let Some(breaker) = &self.breaker {
            if !breaker.try_acquire() {
                debug!(%key, "request suppressed by open circuit");
                let cooldown = breaker
                    .cooldown_remaining()
                    .map(|remaining| Instant::now() + remaining);
                if !revalidation {
                    self.publish_vacant(Phase::Disabled);
                }
                *gate = cooldown;
                return;
            }
            self.breaker_held = true;
        }

        if !revalidation {
            self.publish_loading();
        }

        let request = with_conditionals(request, prior.as_ref());
        let retry = self.options.retry.clone().unwrap_or_else(RetryPolicy::none);
        let shared = self.client.begin_attempt(&key, request, retry);
        *attempt = Some(InFlight {
            generation: self.generation,
            revalidation,
            attempt: shared,
        });
    }

    fn on_settled(
        &mut self,
        (generation, _revalidation, result): (u64, bool, Result<Response, FetchError>),
        attempt: &mut Option<InFlight>,
    ) {
        *attempt = None;
        if generation != self.generation {
            // A superseded attempt settled late; its result is discarded.
            self.release_breaker();
            return;
        }

        match result {
            Ok(response) => {
                self.breaker_feedback(true);
                let effective = match (&self.key, &self.cache_options) {
                    (Some(key), Some(options)) => {
                        let prior = self.client.cache().peek(key);
                        self.client
                            .absorb(key, response, prior.as_ref(), Some(options))
                    }
                    _ => response,
                };
                self.publish_resolved(&effective);
            }
            Err(error) => {
                self.breaker_feedback(false);
                if let Some(hook) = &self.options.on_error {
                    hook(&error);
                }
                self.publish_error(error);
            }
        }
    }

    fn on_command(
        &mut self,
        cmd: Cmd,
        attempt: &mut Option<InFlight>,
        gate: &mut Option<Instant>,
    ) {
        match cmd {
            Cmd::Reload => {
                if let Some(breaker) = &self.breaker {
                    breaker.half_open();
                }
                self.start(attempt, gate, true);
            }
            Cmd::Set(value) => self.apply_set(value),
            Cmd::Update(f) => {
                let current = self.state_tx.borrow().value.clone();
                let value = f(current);
                self.apply_set(value);
            }
            Cmd::Restore(snapshot) => {
                if let (Some(key), Some(options)) = (&self.key, &self.cache_options) {
                    match &snapshot.value {
                        Some(value) => {
                            let response = Response::new(
                                snapshot.status_code.unwrap_or(StatusCode::OK),
                                snapshot.headers.clone().unwrap_or_default(),
                                value.clone(),
                            );
                            self.client.cache().store(
                                key,
                                response,
                                options.stale_time,
                                options.ttl,
                            );
                        }
                        None => self.client.cache().invalidate(key),
                    }
                }
                self.publish(snapshot);
            }
        }
    }

    fn on_cache_event(
        &mut self,
        event: &CacheEvent,
        attempt: &mut Option<InFlight>,
        gate: &mut Option<Instant>,
    ) {
        if self.key.as_deref() != Some(event.key.as_str()) {
            return;
        }
        match event.kind {
            CacheEventKind::Stored => {
                // Another writer refreshed our key; reflect it unless our own
                // attempt is about to.
                if attempt.is_none() {
                    if let Some(entry) = self.client.cache().peek(&event.key) {
                        self.apply_entry(&entry);
                    }
                }
            }
            CacheEventKind::Invalidated => {
                if attempt.is_none() && self.current.is_some() {
                    self.start(attempt, gate, false);
                }
            }
        }
    }

    fn on_breaker_change(
        &mut self,
        state: CircuitState,
        attempt: &mut Option<InFlight>,
        gate: &mut Option<Instant>,
    ) {
        if self.current.is_none() {
            return;
        }
        let suppressed = self.state_tx.borrow().phase == Phase::Disabled;
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                // The group recovered (or is probing); suppressed resources
                // may try again. try_acquire decides who gets the trial.
                if suppressed && attempt.is_none() {
                    self.start(attempt, gate, false);
                }
            }
            CircuitState::Open => {
                if suppressed && attempt.is_none() {
                    *gate = self
                        .breaker
                        .as_ref()
                        .and_then(|breaker| breaker.cooldown_remaining())
                        .map(|remaining| Instant::now() + remaining);
                }
            }
        }
    }

    fn apply_set(&mut self, value: Bytes) {
        let mut next = self.state_tx.borrow().clone();
        next.phase = Phase::Resolved;
        next.error = None;
        next.value = Some(value.clone());
        let status = next.status_code.unwrap_or(StatusCode::OK);
        let headers = next.headers.clone().unwrap_or_default();
        self.publish(next);

        if let (Some(key), Some(options)) = (&self.key, &self.cache_options) {
            let response = Response::new(status, headers, value);
            self.client
                .cache()
                .store(key, response, options.stale_time, options.ttl);
        }
    }

    fn apply_entry(&mut self, entry: &CacheEntry) {
        self.publish_resolved(&entry.response);
    }

    fn publish_resolved(&mut self, response: &Response) {
        self.publish(ResourceState {
            phase: Phase::Resolved,
            value: Some(response.body.clone()),
            error: None,
            status_code: Some(response.status),
            headers: Some(response.headers.clone()),
        });
    }

    fn publish_loading(&mut self) {
        let mut next = self.state_tx.borrow().clone();
        next.phase = Phase::Loading;
        next.error = None;
        if !self.options.keep_previous {
            next.value = None;
            next.status_code = None;
            next.headers = None;
        }
        self.publish(next);
    }

    /// Disabled (or idle) with nothing to show unless `keep_previous` asks
    /// for retention.
    fn publish_vacant(&mut self, phase: Phase) {
        let mut next = self.state_tx.borrow().clone();
        next.phase = phase;
        next.error = None;
        if !self.options.keep_previous {
            next.value = None;
            next.status_code = None;
            next.headers = None;
        }
        self.publish(next);
    }

    fn publish_error(&mut self, error: FetchError) {
        let mut next = self.state_tx.borrow().clone();
        next.phase = Phase::Error;
        next.status_code = error.status();
        next.error = Some(error);
        if !self.options.keep_previous {
            next.value = None;
            next.headers = None;
        }
        self.publish(next);
    }

    fn publish(&mut self, next: ResourceState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn drop_attempt(&mut self, attempt: &mut Option<InFlight>) {
        if attempt.take().is_some() {
            self.release_breaker();
        }
    }

    fn release_breaker(&mut self) {
        if self.breaker_held {
            if let Some(breaker) = &self.breaker {
                breaker.release();
            }
            self.breaker_held = false;
        }
    }

    fn breaker_feedback(&mut self, success: bool) {
        if let Some(breaker) = &self.breaker {
            if success {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
        self.breaker_held = false;
    }
}

async fn next_settlement(
    attempt: &mut Option<InFlight>,
) -> (u64, bool, Result<Response, FetchError>) {
    match attempt {
        Some(inflight) => {
            let result = (&mut inflight.attempt).await;
            (inflight.generation, inflight.revalidation, result)
        }
        None => future::pending().await,
    }
}

async fn next_cache_event(rx: &mut Option<broadcast::Receiver<CacheEvent>>) -> CacheEvent {
    let Some(rx) = rx else {
        return future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return event,
            // Falling behind only costs precision, not correctness.
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return future::pending().await,
        }
    }
}

async fn next_breaker_state(rx: &mut Option<watch::Receiver<CircuitState>>) -> CircuitState {
    match rx {
        Some(rx) => {
            if rx.changed().await.is_ok() {
                *rx.borrow_and_update()
            } else {
                future::pending().await
            }
        }
        None => future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn gate_elapsed(gate: &Option<Instant>) {
    match gate {
        Some(at) => tokio::time::sleep_until(*at).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn wait_for(
        rx: &mut watch::Receiver<ResourceState>,
        pred: impl Fn(&ResourceState) -> bool,
    ) -> ResourceState {
        timeout(Duration::from_secs(1), rx.wait_for(|state| pred(state)))
            .await
            .expect("state within timeout")
            .expect("resource alive")
            .clone()
    }

    #[test]
    fn test_state_predicates() {
        let idle = ResourceState::default();
        assert!(idle.is_idle());
        assert!(!idle.is_loading());

        let resolved = ResourceState {
            phase: Phase::Resolved,
            value: Some(Bytes::from_static(b"v")),
            ..ResourceState::default()
        };
        assert!(resolved.is_resolved());
        assert_eq!(resolved.value().map(|b| &b[..]), Some(&b"v"[..]));

        let error = ResourceState {
            phase: Phase::Error,
            ..ResourceState::default()
        };
        assert!(error.is_error());
        assert!(!error.is_resolved());
    }

    #[tokio::test]
    async fn test_fetches_and_resolves() {
        let transport = MockTransport::ok("payload");
        let client = Arc::new(Client::new(transport.clone()));
        let resource = Resource::new(
            Arc::clone(&client),
            Some(Request::get("https://example.com/a")),
            ResourceOptions::new(),
        );

        let mut rx = resource.subscribe();
        let state = wait_for(&mut rx, ResourceState::is_resolved).await;
        assert_eq!(state.value.expect("value"), "payload");
        assert_eq!(state.status_code, Some(StatusCode::OK));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_absent_request_is_disabled() {
        let client = Arc::new(Client::new(MockTransport::ok("unused")));
        let resource = Resource::new(Arc::clone(&client), None::<Request>, ResourceOptions::new());

        let mut rx = resource.subscribe();
        let state = wait_for(&mut rx, ResourceState::is_disabled).await;
        assert!(state.value.is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_writes_through() {
        let client = Arc::new(Client::new(MockTransport::ok("from server")));
        let request = Request::get("https://example.com/a");
        let key = request.cache_key();
        let resource = Resource::new(
            Arc::clone(&client),
            Some(request),
            ResourceOptions::new(),
        );

        let mut rx = resource.subscribe();
        wait_for(&mut rx, ResourceState::is_resolved).await;

        resource.set("imperative");
        let state = wait_for(&mut rx, |s| {
            s.value.as_deref() == Some(b"imperative".as_slice())
        })
        .await;
        assert!(state.is_resolved());

        let entry = client.cache().get(&key).expect("written through");
        assert_eq!(entry.response.body, "imperative");
    }

    #[tokio::test]
    async fn test_update_derives_from_current() {
        let client = Arc::new(Client::new(MockTransport::ok("abc")));
        let resource = Resource::new(
            Arc::clone(&client),
            Some(Request::get("https://example.com/a")),
            ResourceOptions::new(),
        );

        let mut rx = resource.subscribe();
        wait_for(&mut rx, ResourceState::is_resolved).await;

        resource.update(|current| {
            let mut v = current.map(|b| b.to_vec()).unwrap_or_default();
            v.extend_from_slice(b"!");
            Bytes::from(v)
        });

        let state = wait_for(&mut rx, |s| s.value.as_deref() == Some(b"abc!".as_slice())).await;
        assert!(state.is_resolved());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let client = Arc::new(Client::new(MockTransport::ok("x")));
        let resource = Resource::new(
            Arc::clone(&client),
            Some(Request::get("https://example.com/a")),
            ResourceOptions::new(),
        );
        resource.destroy();
        resource.destroy();
    }
}
