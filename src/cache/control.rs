//! `Cache-Control` parsing and reconciliation with caller-supplied timings.
//!
//! Directives are parsed case-insensitively, one by one, across all
//! `Cache-Control` headers on the response. [`CacheControl::reconcile`]
//! merges them with the caller's `(stale_time, ttl)` into a final storage
//! decision; the server always narrows, never widens, what the caller asked
//! for.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use http::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
//! use larder::cache::{CacheControl, StorePolicy};
//!
//! let mut headers = HeaderMap::new();
//! headers.insert(
//!     CACHE_CONTROL,
//!     HeaderValue::from_static("max-age=60, stale-while-revalidate=30"),
//! );
//!
//! let control = CacheControl::parse(&headers);
//! let policy = control.reconcile(Duration::from_secs(120), Duration::from_secs(600));
//! assert_eq!(
//!     policy,
//!     StorePolicy::Store {
//!         stale_time: Duration::from_secs(30),
//!         ttl: Duration::from_secs(60),
//!     }
//! );
//! ```

use std::time::Duration;

use http::header::{CACHE_CONTROL, HeaderMap};

/// Parsed `Cache-Control` response directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// `no-store`: the response must never be cached.
    pub no_store: bool,
    /// `no-cache`: the response may be cached but must be revalidated.
    pub no_cache: bool,
    /// `must-revalidate`: stale copies must not be served without checking.
    pub must_revalidate: bool,
    /// `immutable`: the response will never change within its lifetime.
    pub immutable: bool,
    /// `max-age` in seconds.
    pub max_age: Option<u64>,
    /// `s-maxage` in seconds; overrides `max-age` when present.
    pub s_maxage: Option<u64>,
    /// `stale-while-revalidate` in seconds.
    pub stale_while_revalidate: Option<u64>,
}

/// The outcome of reconciling directives with caller timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePolicy {
    /// Do not store this response.
    Skip,
    /// Store with the given timings.
    Store {
        /// Freshness window.
        stale_time: Duration,
        /// Total lifetime.
        ttl: Duration,
    },
}

impl CacheControl {
    /// Parses every `Cache-Control` header on the response.
    ///
    /// Unknown directives and malformed values are skipped.
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut control = Self::default();
        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for directive in value.split(',') {
                let directive = directive.trim();
                let (name, arg) = match directive.split_once('=') {
                    Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                    None => (directive, None),
                };
                match name.to_ascii_lowercase().as_str() {
                    "no-store" => control.no_store = true,
                    "no-cache" => control.no_cache = true,
                    "must-revalidate" => control.must_revalidate = true,
                    "immutable" => control.immutable = true,
                    "max-age" => control.max_age = arg.and_then(|a| a.parse().ok()),
                    "s-maxage" => control.s_maxage = arg.and_then(|a| a.parse().ok()),
                    "stale-while-revalidate" => {
                        control.stale_while_revalidate = arg.and_then(|a| a.parse().ok());
                    }
                    _ => {}
                }
            }
        }
        control
    }

    /// Merges the directives with caller-supplied timings.
    ///
    /// Resolution order: `no-store` wins outright; `immutable` pins both
    /// timings to infinity; otherwise the caller's timings are the starting
    /// point, `no-cache`/`must-revalidate` force immediate staleness,
    /// `s-maxage`/`max-age` set the lifetime, and `stale-while-revalidate`
    /// can only shrink the freshness window.
    #[must_use]
    pub fn reconcile(&self, stale_time: Duration, ttl: Duration) -> StorePolicy {
        if self.no_store {
            return StorePolicy::Skip;
        }
        if self.immutable {
            return StorePolicy::Store {
                stale_time: Duration::MAX,
                ttl: Duration::MAX,
            };
        }

        let mut stale_time = stale_time;
        let mut ttl = ttl;

        if self.no_cache || self.must_revalidate {
            stale_time = Duration::ZERO;
        }
        if let Some(secs) = self.s_maxage.or(self.max_age) {
            ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = self.stale_while_revalidate {
            stale_time = stale_time.min(Duration::from_secs(secs));
        }

        StorePolicy::Store { stale_time, ttl }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(CACHE_CONTROL, HeaderValue::from_static(value));
        map
    }

    const CALLER_STALE: Duration = Duration::from_secs(120);
    const CALLER_TTL: Duration = Duration::from_secs(600);

    #[test]
    fn test_parse_directives() {
        let control = CacheControl::parse(&headers(
            "no-cache, max-age=60, stale-while-revalidate=30",
        ));
        assert!(control.no_cache);
        assert!(!control.no_store);
        assert_eq!(control.max_age, Some(60));
        assert_eq!(control.stale_while_revalidate, Some(30));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let control = CacheControl::parse(&headers("No-Store, Max-Age=10"));
        assert!(control.no_store);
        assert_eq!(control.max_age, Some(10));
    }

    #[test]
    fn test_parse_skips_unknown_and_malformed() {
        let control = CacheControl::parse(&headers("private, max-age=abc, max-stale"));
        assert_eq!(control, CacheControl::default());
    }

    #[test]
    fn test_parse_without_header() {
        let control = CacheControl::parse(&HeaderMap::new());
        assert_eq!(control, CacheControl::default());
    }

    #[test]
    fn test_no_store_wins() {
        let control = CacheControl::parse(&headers("no-store, max-age=60, immutable"));
        assert_eq!(control.reconcile(CALLER_STALE, CALLER_TTL), StorePolicy::Skip);
    }

    #[test]
    fn test_immutable_pins_both_timings() {
        let control = CacheControl::parse(&headers("immutable, max-age=5"));
        assert_eq!(
            control.reconcile(CALLER_STALE, CALLER_TTL),
            StorePolicy::Store {
                stale_time: Duration::MAX,
                ttl: Duration::MAX,
            }
        );
    }

    #[test]
    fn test_no_directives_keeps_caller_timings() {
        let control = CacheControl::parse(&HeaderMap::new());
        assert_eq!(
            control.reconcile(CALLER_STALE, CALLER_TTL),
            StorePolicy::Store {
                stale_time: CALLER_STALE,
                ttl: CALLER_TTL,
            }
        );
    }

    #[test]
    fn test_no_cache_forces_immediate_staleness() {
        for value in ["no-cache", "must-revalidate"] {
            let control = CacheControl::parse(&headers(value));
            assert_eq!(
                control.reconcile(CALLER_STALE, CALLER_TTL),
                StorePolicy::Store {
                    stale_time: Duration::ZERO,
                    ttl: CALLER_TTL,
                }
            );
        }
    }

    #[test]
    fn test_max_age_sets_ttl() {
        let control = CacheControl::parse(&headers("max-age=60"));
        assert_eq!(
            control.reconcile(CALLER_STALE, CALLER_TTL),
            StorePolicy::Store {
                stale_time: CALLER_STALE,
                ttl: Duration::from_secs(60),
            }
        );
    }

    #[test]
    fn test_s_maxage_overrides_max_age() {
        let control = CacheControl::parse(&headers("max-age=60, s-maxage=10"));
        assert_eq!(
            control.reconcile(CALLER_STALE, CALLER_TTL),
            StorePolicy::Store {
                stale_time: CALLER_STALE,
                ttl: Duration::from_secs(10),
            }
        );
    }

    #[test]
    fn test_swr_only_shrinks_staleness() {
        // Caller allows 120s of staleness tolerance; the server narrows to 30.
        let control = CacheControl::parse(&headers("stale-while-revalidate=30"));
        assert_eq!(
            control.reconcile(CALLER_STALE, CALLER_TTL),
            StorePolicy::Store {
                stale_time: Duration::from_secs(30),
                ttl: CALLER_TTL,
            }
        );

        // Caller is already stricter; the directive must not widen it.
        let strict = Duration::from_secs(5);
        assert_eq!(
            control.reconcile(strict, CALLER_TTL),
            StorePolicy::Store {
                stale_time: strict,
                ttl: CALLER_TTL,
            }
        );
    }

    #[test]
    fn test_max_age_with_swr() {
        let control = CacheControl::parse(&headers("max-age=60, stale-while-revalidate=30"));
        assert_eq!(
            control.reconcile(Duration::MAX, Duration::MAX),
            StorePolicy::Store {
                stale_time: Duration::from_secs(30),
                ttl: Duration::from_secs(60),
            }
        );
    }
}
