//! Request deduplication (single flight).
//!
//! Concurrent callers whose requests share a fingerprint attach to one
//! in-flight attempt instead of issuing their own network call; the result is
//! fanned out to every waiter. A waiter detaches by dropping its handle. The
//! underlying call is aborted only when the *last* waiter detaches before
//! settlement; one caller bailing out never cancels the call for the others.
//!
//! Retries happen inside the attempt future, so a retried call never
//! re-enters the map as a new logical request.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::request::Response;

type Settled = Result<Response, FetchError>;

/// A handle to a (possibly shared) in-flight attempt. Await it for the
/// outcome; drop it to detach.
pub type Attempt = Shared<BoxFuture<'static, Settled>>;

struct Flight {
    id: u64,
    handle: WeakShared<BoxFuture<'static, Settled>>,
}

/// Fingerprint → in-flight attempt map.
///
/// The map holds only weak handles: waiters keep the attempt alive, and when
/// the last one lets go the attempt future is dropped, its cancellation
/// token fires, and the slot is cleared.
pub struct DedupeMap {
    inflight: Arc<DashMap<String, Flight>>,
    next_id: AtomicU64,
}

impl DedupeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Attaches to the in-flight attempt for `key`, starting one with
    /// `start` if none is running.
    ///
    /// `start` receives the attempt's cancellation token; it fires when the
    /// last waiter has detached and the transport should abort.
    pub fn join<F>(&self, key: &str, start: F) -> Attempt
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, Settled>,
    {
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if let Some(attempt) = occupied.get().handle.upgrade() {
                    return attempt;
                }
                // The previous attempt was dropped; replace it.
                let (flight, attempt) = self.launch(key, start);
                occupied.insert(flight);
                attempt
            }
            Entry::Vacant(vacant) => {
                let (flight, attempt) = self.launch(key, start);
                vacant.insert(flight);
                attempt
            }
        }
    }

    /// Number of attempts currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// Whether no attempt is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    fn launch<F>(&self, key: &str, start: F) -> (Flight, Attempt)
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, Settled>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let inner = start(cancel.clone());
        let guard = FlightGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.to_string(),
            id,
            cancel,
        };
        let attempt: Attempt = async move {
            // Held across the await: clears the slot (and fires the token)
            // whether the attempt settles or is dropped mid-flight.
            let _guard = guard;
            inner.await
        }
        .boxed()
        .shared();

        let handle = match attempt.downgrade() {
            Some(handle) => handle,
            // A freshly created Shared has not been polled, let alone settled.
            None => unreachable!("attempt settled before first poll"),
        };
        (Flight { id, handle }, attempt)
    }
}

impl Default for DedupeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DedupeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupeMap")
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

struct FlightGuard {
    inflight: Arc<DashMap<String, Flight>>,
    key: String,
    id: u64,
    cancel: CancellationToken,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        // Only clear the slot if it still belongs to this attempt.
        self.inflight.remove_if(&self.key, |_, flight| flight.id == self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::sleep;

    fn slow_ok(
        starts: &Arc<AtomicUsize>,
        body: &'static str,
        delay: Duration,
    ) -> impl FnOnce(CancellationToken) -> BoxFuture<'static, Settled> {
        let starts = Arc::clone(starts);
        move |_cancel| {
            starts.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(delay).await;
                Ok(Response::ok(body))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_identical_fingerprints_share_one_call() {
        let map = DedupeMap::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let a = map.join("k", slow_ok(&starts, "v", Duration::from_millis(20)));
        let b = map.join("k", slow_ok(&starts, "v", Duration::from_millis(20)));

        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.expect("shared result").body, "v");
        assert_eq!(rb.expect("shared result").body, "v");
        assert_eq!(starts.load(Ordering::SeqCst), 1, "exactly one call started");
    }

    #[tokio::test]
    async fn test_different_fingerprints_do_not_share() {
        let map = DedupeMap::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let a = map.join("a", slow_ok(&starts, "1", Duration::from_millis(5)));
        let b = map.join("b", slow_ok(&starts, "2", Duration::from_millis(5)));

        let _ = tokio::join!(a, b);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slot_clears_after_settlement() {
        let map = DedupeMap::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let first = map.join("k", slow_ok(&starts, "v", Duration::from_millis(5)));
        let _ = first.await;
        assert!(map.is_empty(), "settled attempt should clear its slot");

        let second = map.join("k", slow_ok(&starts, "v", Duration::from_millis(5)));
        let _ = second.await;
        assert_eq!(starts.load(Ordering::SeqCst), 2, "new window, new call");
    }

    #[tokio::test]
    async fn test_one_waiter_detaching_keeps_the_call_alive() {
        let map = DedupeMap::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let a = map.join("k", slow_ok(&starts, "v", Duration::from_millis(30)));
        let b = map.join("k", slow_ok(&starts, "v", Duration::from_millis(30)));

        drop(a);
        let result = b.await;
        assert_eq!(result.expect("call survived first detach").body, "v");
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_waiter_detaching_aborts_the_call() {
        let map = DedupeMap::new();
        let seen_cancel = Arc::new(Mutex::new(None::<CancellationToken>));

        let token_out = Arc::clone(&seen_cancel);
        let attempt = map.join("k", move |cancel| {
            *token_out.lock().expect("test lock") = Some(cancel);
            async move {
                sleep(Duration::from_secs(10)).await;
                Ok(Response::ok("never"))
            }
            .boxed()
        });

        drop(attempt);

        let token = seen_cancel
            .lock()
            .expect("test lock")
            .clone()
            .expect("start ran");
        assert!(token.is_cancelled(), "last detach aborts the call");
        assert!(map.is_empty(), "aborted attempt should clear its slot");
    }
}
