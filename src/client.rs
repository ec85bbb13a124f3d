//! The shared client: one per process (or per backend).
//!
//! A [`Client`] owns the three pieces of cross-resource state: the
//! [`CacheStore`], the in-flight [`DedupeMap`], and the transport. Every
//! resource and mutation created against the same client shares them, which
//! is what makes deduplication and cache fan-out work across the process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use http::StatusCode;
use tracing::debug;

use crate::cache::{CacheControl, CacheEntry, CacheStore, StorePolicy};
use crate::config::CacheOptions;
use crate::dedupe::{Attempt, DedupeMap};
use crate::error::FetchError;
use crate::request::{Request, Response};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// Shared cache, in-flight map, and transport.
pub struct Client {
    transport: Arc<dyn Transport>,
    cache: CacheStore,
    inflight: DedupeMap,
    bandwidth_constrained: AtomicBool,
}

impl Client {
    /// Creates a client around the given transport.
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self::with_transport(Arc::new(transport))
    }

    /// Creates a client around an already-shared transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: CacheStore::new(),
            inflight: DedupeMap::new(),
            bandwidth_constrained: AtomicBool::new(false),
        }
    }

    /// The shared cache store.
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Marks `key` stale, making every resource bound to it revalidate.
    pub fn invalidate(&self, key: &str) {
        self.cache.invalidate(key);
    }

    /// Feeds the embedder's knowledge of the network conditions. While set,
    /// prefetching is a no-op.
    pub fn set_bandwidth_constrained(&self, constrained: bool) {
        self.bandwidth_constrained
            .store(constrained, Ordering::Relaxed);
    }

    /// Whether prefetching is currently suppressed.
    #[must_use]
    pub fn is_bandwidth_constrained(&self) -> bool {
        self.bandwidth_constrained.load(Ordering::Relaxed)
    }

    /// Warms the cache for `request` without binding the result to any
    /// resource.
    ///
    /// Skipped entirely when the cache already holds a fresh entry or the
    /// bandwidth hint is set. Never fails: errors are logged and swallowed.
    pub async fn prefetch(&self, request: Request, options: &CacheOptions) {
        if self.is_bandwidth_constrained() {
            debug!("prefetch skipped: bandwidth constrained");
            return;
        }

        let key = derive_key(&request, options);
        let prior = self.cache.peek(&key);
        if prior.as_ref().is_some_and(|entry| !entry.is_stale()) {
            return;
        }

        let request = with_conditionals(request, prior.as_ref());
        let attempt = self.begin_attempt(&key, request, RetryPolicy::none());
        match attempt.await {
            Ok(response) => {
                self.absorb(&key, response, prior.as_ref(), Some(options));
            }
            Err(err) => debug!(%err, %key, "prefetch failed"),
        }
    }

    /// Joins (or starts) the deduplicated attempt for `key`.
    ///
    /// The retry loop runs inside the attempt, so a retried call extends the
    /// same in-flight window instead of opening a new one.
    pub(crate) fn begin_attempt(
        &self,
        key: &str,
        request: Request,
        retry: RetryPolicy,
    ) -> Attempt {
        let transport = Arc::clone(&self.transport);
        self.inflight.join(key, move |cancel| {
            async move {
                retry
                    .run(|_attempt| {
                        let transport = Arc::clone(&transport);
                        let request = request.clone();
                        let cancel = cancel.clone();
                        async move {
                            let response = transport.send(request, cancel).await?;
                            classify(response)
                        }
                    })
                    .await
            }
            .boxed()
        })
    }

    /// Performs a one-shot call outside the dedupe layer.
    ///
    /// Used by mutations, which must race at the transport level instead of
    /// coalescing with reads (or with each other).
    pub(crate) async fn perform(
        &self,
        request: Request,
        retry: RetryPolicy,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Response, FetchError> {
        let transport = Arc::clone(&self.transport);
        retry
            .run(|_attempt| {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                let cancel = cancel.clone();
                async move {
                    let response = transport.send(request, cancel).await?;
                    classify(response)
                }
            })
            .await
    }

    /// Reconciles a settled response with the cache.
    ///
    /// Folds a `304 Not Modified` into the prior entry's body, then stores
    /// the effective response according to its `Cache-Control` directives
    /// and the caller's timings. Returns the effective response.
    pub(crate) fn absorb(
        &self,
        key: &str,
        response: Response,
        prior: Option<&CacheEntry>,
        options: Option<&CacheOptions>,
    ) -> Response {
        let effective = if response.status == StatusCode::NOT_MODIFIED {
            match prior {
                Some(entry) => entry.merged_with(&response.headers),
                None => response,
            }
        } else {
            response
        };

        if let Some(options) = options {
            let control = CacheControl::parse(&effective.headers);
            match control.reconcile(options.stale_time, options.ttl) {
                StorePolicy::Skip => debug!(%key, "response not stored: no-store"),
                StorePolicy::Store { stale_time, ttl } => {
                    self.cache.store(key, effective.clone(), stale_time, ttl);
                }
            }
        }
        effective
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("cache_entries", &self.cache.len())
            .field("inflight", &self.inflight.len())
            .finish_non_exhaustive()
    }
}

/// The cache key for `request` under the given options.
pub(crate) fn derive_key(request: &Request, options: &CacheOptions) -> String {
    options
        .key
        .as_ref()
        .map_or_else(|| request.cache_key(), |key_fn| key_fn(request))
}

/// Attaches `If-None-Match`/`If-Modified-Since` from a prior entry.
pub(crate) fn with_conditionals(mut request: Request, prior: Option<&CacheEntry>) -> Request {
    if let Some(entry) = prior {
        for (name, value) in entry.conditional_headers() {
            request.headers.insert(name, value);
        }
    }
    request
}

/// Transport-level success is only halfway: non-2xx statuses (other than a
/// conditional-revalidation `304`) become fetch errors here, which also makes
/// them visible to the retry policy.
fn classify(response: Response) -> Result<Response, FetchError> {
    if response.is_success() || response.status == StatusCode::NOT_MODIFIED {
        Ok(response)
    } else {
        Err(FetchError::Status {
            status: response.status,
        })
    }
}
