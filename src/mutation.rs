//! One-shot write operations with optimistic updates.
//!
//! A [`Mutation`] is the write-side counterpart of a
//! [`Resource`](crate::resource::Resource): the same transport, breaker, and
//! retry machinery, but for discrete operations that are not repeatable
//! reads. Caching, previous-value retention, and automatic refresh are
//! disabled by construction.
//!
//! Each [`mutate`](Mutation::mutate) call runs exactly one attempt through
//! these lifecycle hooks, in order:
//!
//! 1. `on_mutate(&request) -> context` (and, if an optimistic target is
//!    configured, the target's value is snapshotted and overwritten with the
//!    mutated value),
//! 2. on settlement, `on_success(&response, &mut context)` — the target is
//!    overwritten with the server-confirmed result — or
//!    `on_error(&error, &mut context)` — the target snapshot is restored,
//! 3. always `on_settled(context)`.
//!
//! Issuing a new `mutate` while one is pending starts a new attempt without
//! waiting; overlapping mutations race at the transport level by design, and
//! callers are responsible for disabling concurrent submission in the UI.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use larder::client::Client;
//! use larder::config::MutationOptions;
//! use larder::mutation::{Mutation, MutationHooks};
//! use larder::request::Request;
//! use larder::transport::mock::MockTransport;
//!
//! # fn example(client: Arc<Client>) {
//! let save: Mutation = Mutation::new(client, MutationOptions::new())
//!     .hooks(MutationHooks::new().on_success(|response, _ctx| {
//!         println!("saved: {} bytes", response.body.len());
//!     }));
//!
//! save.mutate(Request::post("https://api.example.com/users").body("{\"name\":\"ada\"}"));
//! # }
//! ```

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::client::Client;
use crate::config::MutationOptions;
use crate::error::FetchError;
use crate::request::{Request, Response};
use crate::resource::Resource;
use crate::retry::RetryPolicy;

/// The state of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState {
    /// No mutation has been issued yet.
    Idle,
    /// The circuit breaker suppressed the attempt. Not an error.
    Disabled,
    /// A mutation is in flight.
    Loading,
    /// The last mutation succeeded.
    Success(Response),
    /// The last mutation failed terminally.
    Error(FetchError),
}

impl MutationState {
    /// Returns the response if the last mutation succeeded.
    #[must_use]
    pub const fn data(&self) -> Option<&Response> {
        match self {
            Self::Success(response) => Some(response),
            _ => None,
        }
    }

    /// Returns the error if the last mutation failed.
    #[must_use]
    pub const fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Returns `true` while a mutation is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns `true` if the last mutation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns `true` if the last mutation failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

type OnMutate<C> = Box<dyn Fn(&Request) -> C + Send + Sync>;
type OnSuccess<C> = Box<dyn Fn(&Response, &mut C) + Send + Sync>;
type OnError<C> = Box<dyn Fn(&FetchError, &mut C) + Send + Sync>;
type OnSettled<C> = Box<dyn Fn(C) + Send + Sync>;

/// Lifecycle hooks for a mutation.
///
/// `C` is the caller's context type, produced by `on_mutate` and threaded
/// through to the settlement hooks.
pub struct MutationHooks<C = ()> {
    on_mutate: Option<OnMutate<C>>,
    on_success: Option<OnSuccess<C>>,
    on_error: Option<OnError<C>>,
    on_settled: Option<OnSettled<C>>,
}

impl<C> MutationHooks<C> {
    /// No hooks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            on_mutate: None,
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }

    /// Runs before the attempt; its return value is the context.
    #[must_use]
    pub fn on_mutate(mut self, f: impl Fn(&Request) -> C + Send + Sync + 'static) -> Self {
        self.on_mutate = Some(Box::new(f));
        self
    }

    /// Runs when the attempt succeeds.
    #[must_use]
    pub fn on_success(mut self, f: impl Fn(&Response, &mut C) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Runs when the attempt fails terminally.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&FetchError, &mut C) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Runs after either outcome, consuming the context.
    #[must_use]
    pub fn on_settled(mut self, f: impl Fn(C) + Send + Sync + 'static) -> Self {
        self.on_settled = Some(Box::new(f));
        self
    }
}

impl<C> Default for MutationHooks<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for MutationHooks<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationHooks")
            .field("on_mutate", &self.on_mutate.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_settled", &self.on_settled.is_some())
            .finish()
    }
}

/// A one-shot write orchestrator.
pub struct Mutation<C: Default + Send + 'static = ()> {
    client: Arc<Client>,
    options: MutationOptions,
    breaker: Option<Arc<CircuitBreaker>>,
    hooks: Arc<MutationHooks<C>>,
    template: Option<Request>,
    target: Option<Arc<Resource>>,
    state_tx: Arc<watch::Sender<MutationState>>,
    destroy: CancellationToken,
}

impl<C: Default + Send + 'static> Mutation<C> {
    /// Creates a mutation bound to a client.
    #[must_use]
    pub fn new(client: Arc<Client>, options: MutationOptions) -> Self {
        let breaker = options.breaker.resolve();
        let (state_tx, _) = watch::channel(MutationState::Idle);
        Self {
            client,
            options,
            breaker,
            hooks: Arc::new(MutationHooks::new()),
            template: None,
            target: None,
            state_tx: Arc::new(state_tx),
            destroy: CancellationToken::new(),
        }
    }

    /// Installs lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: MutationHooks<C>) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Sets a base request reused by [`mutate_body`](Self::mutate_body).
    #[must_use]
    pub fn template(mut self, template: Request) -> Self {
        self.template = Some(template);
        self
    }

    /// Binds an optimistic target: on each mutation the target's value is
    /// snapshotted and overwritten with the mutated value immediately, then
    /// either confirmed with the server result or rolled back on failure.
    #[must_use]
    pub fn optimistic(mut self, target: Arc<Resource>) -> Self {
        self.target = Some(target);
        self
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> MutationState {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MutationState> {
        self.state_tx.subscribe()
    }

    /// State changes as a stream.
    #[must_use]
    pub fn changes(&self) -> BoxStream<'static, MutationState> {
        WatchStream::from_changes(self.state_tx.subscribe()).boxed()
    }

    /// Runs one attempt for `request`.
    ///
    /// Returns immediately; the outcome lands in the observable state and
    /// the hooks. Does not queue: a second call while one attempt is pending
    /// races it.
    pub fn mutate(&self, request: Request) {
        if let Some(breaker) = &self.breaker {
            if !breaker.try_acquire() {
                debug!("mutation suppressed by open circuit");
                self.state_tx.send_replace(MutationState::Disabled);
                return;
            }
        }

        // Optimistic apply happens before the request leaves, so the UI
        // reflects the write immediately.
        let rollback = self.target.as_ref().map(|target| {
            let snapshot = target.snapshot();
            if let Some(body) = request.body.clone() {
                target.set(body);
            }
            (Arc::clone(target), snapshot)
        });
        let mut context = self
            .hooks
            .on_mutate
            .as_ref()
            .map_or_else(C::default, |f| f(&request));

        self.state_tx.send_replace(MutationState::Loading);

        let client = Arc::clone(&self.client);
        let hooks = Arc::clone(&self.hooks);
        let breaker = self.breaker.clone();
        let on_error = self.options.on_error.clone();
        let retry = self.options.retry.clone().unwrap_or_else(RetryPolicy::none);
        let state_tx = Arc::clone(&self.state_tx);
        let cancel = self.destroy.child_token();

        tokio::spawn(async move {
            let result = client.perform(request, retry, cancel).await;
            match result {
                Ok(response) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success();
                    }
                    if let Some((target, _snapshot)) = &rollback {
                        target.set(response.body.clone());
                    }
                    if let Some(f) = &hooks.on_success {
                        f(&response, &mut context);
                    }
                    state_tx.send_replace(MutationState::Success(response));
                }
                Err(error) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure();
                    }
                    if let Some((target, snapshot)) = rollback {
                        target.restore(snapshot);
                    }
                    if let Some(f) = &hooks.on_error {
                        f(&error, &mut context);
                    }
                    if let Some(hook) = &on_error {
                        hook(&error);
                    }
                    state_tx.send_replace(MutationState::Error(error));
                }
            }
            if let Some(f) = &hooks.on_settled {
                f(context);
            }
        });
    }

    /// Runs one attempt using the configured template with `body` as the
    /// request body. A no-op (with a log line) when no template is set.
    pub fn mutate_body(&self, body: impl Into<bytes::Bytes>) {
        match &self.template {
            Some(template) => self.mutate(template.clone().body(body)),
            None => debug!("mutate_body called without a template"),
        }
    }

    /// Cancels any in-flight attempt. Idempotent; also runs on drop.
    pub fn destroy(&self) {
        self.destroy.cancel();
    }
}

impl<C: Default + Send + 'static> Drop for Mutation<C> {
    fn drop(&mut self) {
        self.destroy.cancel();
    }
}

impl<C: Default + Send + 'static> std::fmt::Debug for Mutation<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutation")
            .field("state", &*self.state_tx.borrow())
            .field("optimistic", &self.target.is_some())
            .finish_non_exhaustive()
    }
}
