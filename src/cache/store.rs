//! The process-wide response cache.
//!
//! One [`CacheStore`] instance is shared by every resource that goes through
//! the same [`Client`](crate::client::Client). Entries are keyed by the
//! canonical request key, carry their own `(stale_time, ttl)` bookkeeping,
//! and every mutation is broadcast to subscribers so that resources can react
//! to stores and invalidations performed elsewhere in the process.

use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::entry::CacheEntry;
use crate::request::Response;

/// Capacity of the change-notification channel. Slow subscribers that fall
/// further behind than this miss events rather than blocking writers.
const EVENT_CAPACITY: usize = 100;

/// What happened to a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// A new value was stored under the key.
    Stored,
    /// The key was invalidated and should be revalidated by readers.
    Invalidated,
}

/// A change notification for one cache key.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// The affected key.
    pub key: String,
    /// What happened.
    pub kind: CacheEventKind,
}

/// Key→entry map with TTL and stale-while-revalidate bookkeeping.
///
/// Reads and writes for a given key are linearizable: a `store` always
/// overwrites whatever the most recent prior store or eviction left behind,
/// and subscribers are notified within the same call that performed the
/// mutation.
#[derive(Debug)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    events_tx: broadcast::Sender<CacheEvent>,
}

impl CacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: DashMap::new(),
            events_tx,
        }
    }

    /// Looks up `key`, evicting the entry if its `ttl` has elapsed.
    ///
    /// A stale-but-unexpired entry is returned as-is; deciding to revalidate
    /// is the reader's job. This retains the most recent non-expired value
    /// across a stale→revalidating transition.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(entry.value().clone());
            }
        }
        // Re-check under the removal so a concurrent fresh store survives.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        None
    }

    /// Point-in-time lookup that never evicts.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value().clone())
    }

    /// Stores `response` under `key` with the given timings.
    pub fn store(&self, key: &str, response: Response, stale_time: Duration, ttl: Duration) {
        self.entries
            .insert(key.to_string(), CacheEntry::new(response, stale_time, ttl));
        self.notify(key, CacheEventKind::Stored);
    }

    /// Marks `key` stale and tells subscribers to revalidate.
    ///
    /// The entry itself is retained so readers keep their last-known-good
    /// value while the refresh is running.
    pub fn invalidate(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.mark_stale();
        }
        self.notify(key, CacheEventKind::Invalidated);
    }

    /// Invalidates every key starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Drops every entry, notifying subscribers key by key.
    pub fn clear(&self) {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        self.entries.clear();
        for key in keys {
            self.notify(&key, CacheEventKind::Invalidated);
        }
    }

    /// Number of live (possibly stale, not expired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events_tx.subscribe()
    }

    /// Change notifications as a stream. Lagged events are dropped.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, CacheEvent> {
        BroadcastStream::new(self.events_tx.subscribe())
            .filter_map(|result| async move { result.ok() })
            .boxed()
    }

    fn notify(&self, key: &str, kind: CacheEventKind) {
        let _ = self.events_tx.send(CacheEvent {
            key: key.to_string(),
            kind,
        });
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
