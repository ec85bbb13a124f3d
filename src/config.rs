//! Resource and mutation configuration.
//!
//! The dynamic option bags of typical client-side fetching layers
//! (`cache: true | {…}`, `circuitBreaker: config | instance | bool`) are
//! expressed as tagged enums here, so "enabled with defaults" and "enabled
//! with overrides" are distinct, checkable cases.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::error::FetchError;
use crate::request::{EqFn, KeyFn};
use crate::retry::RetryPolicy;

/// Called once per terminal failed attempt.
pub type ErrorHook = Arc<dyn Fn(&FetchError) + Send + Sync>;

/// Caching behavior for one resource.
#[derive(Clone, Default)]
pub enum CacheMode {
    /// Responses are never written to or read from the shared store.
    Off,
    /// Cache with default timings.
    #[default]
    Defaults,
    /// Cache with explicit timings and/or a custom key function.
    Custom(CacheOptions),
}

impl CacheMode {
    /// The effective cache options, or `None` when caching is off.
    #[must_use]
    pub fn resolve(&self) -> Option<CacheOptions> {
        match self {
            Self::Off => None,
            Self::Defaults => Some(CacheOptions::default()),
            Self::Custom(options) => Some(options.clone()),
        }
    }
}

impl fmt::Debug for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::Defaults => f.write_str("Defaults"),
            Self::Custom(options) => f.debug_tuple("Custom").field(options).finish(),
        }
    }
}

/// Cache timings for one resource.
#[derive(Clone)]
pub struct CacheOptions {
    /// Total entry lifetime. `Duration::MAX` never expires.
    pub ttl: Duration,
    /// Freshness window. Defaults to zero: always revalidate on read unless
    /// response directives say otherwise.
    pub stale_time: Duration,
    /// Custom key derivation; falls back to the canonical request key.
    pub key: Option<KeyFn>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            stale_time: Duration::ZERO,
            key: None,
        }
    }
}

impl CacheOptions {
    /// Creates options with the given timings.
    #[must_use]
    pub const fn new(stale_time: Duration, ttl: Duration) -> Self {
        Self {
            ttl,
            stale_time,
            key: None,
        }
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("ttl", &self.ttl)
            .field("stale_time", &self.stale_time)
            .field("key", &self.key.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Circuit-breaker wiring for one resource.
#[derive(Clone, Default)]
pub enum BreakerMode {
    /// No failure isolation.
    #[default]
    Off,
    /// A private breaker with default tuning.
    Defaults,
    /// A private breaker with explicit tuning.
    Config(BreakerConfig),
    /// A breaker shared with other resources; failures anywhere in the
    /// group suppress the whole group.
    Shared(Arc<CircuitBreaker>),
}

impl BreakerMode {
    /// Materializes the breaker instance, if any.
    #[must_use]
    pub fn resolve(&self) -> Option<Arc<CircuitBreaker>> {
        match self {
            Self::Off => None,
            Self::Defaults => Some(Arc::new(CircuitBreaker::default())),
            Self::Config(config) => Some(Arc::new(CircuitBreaker::new(*config))),
            Self::Shared(breaker) => Some(Arc::clone(breaker)),
        }
    }
}

impl fmt::Debug for BreakerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::Defaults => f.write_str("Defaults"),
            Self::Config(config) => f.debug_tuple("Config").field(config).finish(),
            Self::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

/// Full configuration for a [`Resource`](crate::resource::Resource).
#[derive(Clone, Default)]
pub struct ResourceOptions {
    /// Caching behavior. Defaults to caching with default timings.
    pub cache: CacheMode,
    /// Keep the previous value, status, and headers visible while a new
    /// attempt is loading or after it failed.
    pub keep_previous: bool,
    /// Automatic refetch interval.
    pub refresh: Option<Duration>,
    /// Retry policy. `None` means a single attempt.
    pub retry: Option<RetryPolicy>,
    /// Failure isolation.
    pub breaker: BreakerMode,
    /// Called once per terminal failure.
    pub on_error: Option<ErrorHook>,
    /// Change-detection equality for derived requests. Defaults to
    /// structural comparison.
    pub eq: Option<EqFn>,
}

impl ResourceOptions {
    /// Options with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the caching behavior.
    #[must_use]
    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Keeps the previous value visible across reloads and failures.
    #[must_use]
    pub fn keep_previous(mut self) -> Self {
        self.keep_previous = true;
        self
    }

    /// Refetches on a fixed interval.
    #[must_use]
    pub fn refresh(mut self, every: Duration) -> Self {
        self.refresh = Some(every);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the circuit-breaker wiring.
    #[must_use]
    pub fn breaker(mut self, breaker: BreakerMode) -> Self {
        self.breaker = breaker;
        self
    }

    /// Installs a terminal-failure callback.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Overrides change-detection equality.
    #[must_use]
    pub fn eq(mut self, eq: EqFn) -> Self {
        self.eq = Some(eq);
        self
    }
}

/// Configuration for a [`Mutation`](crate::mutation::Mutation).
///
/// Mutations are one-shot writes: caching, previous-value retention, and
/// automatic refresh do not apply, so only the failure-handling knobs remain.
#[derive(Clone, Default)]
pub struct MutationOptions {
    /// Retry policy. `None` means a single attempt, which is the safe
    /// default for non-idempotent writes.
    pub retry: Option<RetryPolicy>,
    /// Failure isolation.
    pub breaker: BreakerMode,
    /// Called once per terminal failure.
    pub on_error: Option<ErrorHook>,
}

impl MutationOptions {
    /// Options with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the circuit-breaker wiring.
    #[must_use]
    pub fn breaker(mut self, breaker: BreakerMode) -> Self {
        self.breaker = breaker;
        self
    }

    /// Installs a terminal-failure callback.
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .field("on_error", &self.on_error.as_ref().map(|_| "hook"))
            .finish()
    }
}

impl fmt::Debug for ResourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("cache", &self.cache)
            .field("keep_previous", &self.keep_previous)
            .field("refresh", &self.refresh)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .field("on_error", &self.on_error.as_ref().map(|_| "hook"))
            .field("eq", &self.eq.as_ref().map(|_| "custom"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_mode_resolution() {
        assert!(CacheMode::Off.resolve().is_none());

        let defaults = CacheMode::Defaults.resolve().expect("enabled");
        assert_eq!(defaults.stale_time, Duration::ZERO);
        assert_eq!(defaults.ttl, Duration::from_secs(300));

        let custom = CacheMode::Custom(CacheOptions::new(
            Duration::from_secs(30),
            Duration::from_secs(60),
        ))
        .resolve()
        .expect("enabled");
        assert_eq!(custom.stale_time, Duration::from_secs(30));
        assert_eq!(custom.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_breaker_mode_resolution() {
        assert!(BreakerMode::Off.resolve().is_none());
        assert!(BreakerMode::Defaults.resolve().is_some());

        let shared = Arc::new(CircuitBreaker::default());
        let resolved = BreakerMode::Shared(Arc::clone(&shared))
            .resolve()
            .expect("enabled");
        assert!(Arc::ptr_eq(&resolved, &shared), "shared instance is reused");
    }

    #[test]
    fn test_builder_chain() {
        let options = ResourceOptions::new()
            .cache(CacheMode::Off)
            .keep_previous()
            .refresh(Duration::from_secs(10))
            .retry(RetryPolicy::default())
            .breaker(BreakerMode::Defaults)
            .on_error(|_| {});

        assert!(options.cache.resolve().is_none());
        assert!(options.keep_previous);
        assert_eq!(options.refresh, Some(Duration::from_secs(10)));
        assert!(options.retry.is_some());
        assert!(options.on_error.is_some());
    }
}
