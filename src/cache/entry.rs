use std::time::{Duration, Instant};

use http::header::{self, HeaderMap, HeaderValue};

use crate::request::Response;

/// A cached response with timestamp and lifetime bookkeeping.
///
/// `Duration::MAX` stands in for an infinite `ttl` or `stale_time`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached response.
    pub response: Response,
    /// When the entry was stored.
    pub stored_at: Instant,
    /// How long the entry may be served at all. Once elapsed the entry is
    /// treated as absent and evicted on the next read.
    pub ttl: Duration,
    /// How long the entry is considered fresh. Once elapsed the entry is
    /// still served, but a revalidation must be scheduled.
    pub stale_time: Duration,
}

impl CacheEntry {
    /// Creates a new entry stamped with the current time.
    #[must_use]
    pub fn new(response: Response, stale_time: Duration, ttl: Duration) -> Self {
        Self {
            response,
            stored_at: Instant::now(),
            ttl,
            stale_time,
        }
    }

    /// Whether the entry has outlived its `ttl` and must be evicted.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }

    /// Whether the entry is past its freshness window.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stored_at.elapsed() > self.stale_time
    }

    /// Forces the entry stale so the next read schedules revalidation.
    pub fn mark_stale(&mut self) {
        self.stale_time = Duration::ZERO;
    }

    /// Replaces the response, resetting the timestamp.
    pub fn update(&mut self, response: Response) {
        self.response = response;
        self.stored_at = Instant::now();
    }

    /// The validator headers to attach to a conditional re-request.
    ///
    /// Produces `If-None-Match` from the cached `ETag` and
    /// `If-Modified-Since` from the cached `Last-Modified`, when present.
    #[must_use]
    pub fn conditional_headers(&self) -> Vec<(header::HeaderName, HeaderValue)> {
        let mut out = Vec::new();
        if let Some(etag) = self.response.headers.get(header::ETAG) {
            out.push((header::IF_NONE_MATCH, etag.clone()));
        }
        if let Some(modified) = self.response.headers.get(header::LAST_MODIFIED) {
            out.push((header::IF_MODIFIED_SINCE, modified.clone()));
        }
        out
    }

    /// Folds a `304 Not Modified` answer into this entry's response.
    ///
    /// The cached body and status are kept; headers present on the 304
    /// overwrite their cached counterparts.
    #[must_use]
    pub fn merged_with(&self, not_modified_headers: &HeaderMap) -> Response {
        let mut response = self.response.clone();
        for (name, value) in not_modified_headers {
            response.headers.insert(name.clone(), value.clone());
        }
        response
    }
}
