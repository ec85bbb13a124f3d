//! Circuit breaker for failure isolation.
//!
//! # States
//! - **Closed**: normal operation, requests pass through.
//! - **Open**: repeated failures tripped the breaker; requests are suppressed.
//! - **Half-open**: the cooldown elapsed; exactly one trial request may pass.
//!
//! # Transitions
//! ```text
//! Closed    → Open:      consecutive failures reach the threshold
//! Open      → Half-open: cooldown elapsed (on next admission check),
//!                        or a manual half_open() call
//! Half-open → Closed:    the trial request succeeds (counter resets)
//! Half-open → Open:      the trial request fails (cooldown restarts)
//! ```
//!
//! A breaker can be private to one resource or shared by several (wrap it in
//! an [`Arc`](std::sync::Arc) and hand the clone to each); sharing means a
//! failure anywhere in the group suppresses requests for the whole group.
//!
//! Suppression is not an error: a suppressed resource reports itself as
//! disabled and consumes nothing from its retry budget.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub threshold: u32,
    /// How long the breaker stays open before admitting a trial request.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// The observable state of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through.
    Closed,
    /// Requests are suppressed.
    Open,
    /// One trial request is allowed through.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Three-state failure-isolation machine.
///
/// All mutation goes through one internal lock, and every transition is
/// published on a watch channel so dependents can react to the group
/// reopening or recovering.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CircuitState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        let (state_tx, _) = watch::channel(CircuitState::Closed);
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            state_tx,
        }
    }

    /// The breaker's configuration.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Asks to admit one request.
    ///
    /// Returns `false` while the breaker is open (or while a half-open trial
    /// is already out). An open breaker whose cooldown has elapsed flips to
    /// half-open here and admits the caller as the trial. Every admitted
    /// caller must eventually report back through [`record_success`],
    /// [`record_failure`], or [`release`].
    ///
    /// [`record_success`]: Self::record_success
    /// [`record_failure`]: Self::record_failure
    /// [`release`]: Self::release
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    self.publish(&inner);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful outcome for an admitted request.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.trial_in_flight = false;
        if inner.state != CircuitState::Closed {
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            self.publish(&inner);
        }
    }

    /// Records a failed outcome for an admitted request.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    self.publish(&inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                self.publish(&inner);
            }
            CircuitState::Open => {}
        }
    }

    /// Abandons an admitted request without an outcome (it was superseded or
    /// cancelled), freeing the half-open trial slot if this caller held it.
    pub fn release(&self) {
        let mut inner = self.lock();
        inner.trial_in_flight = false;
    }

    /// Forces an open breaker into half-open immediately, bypassing the
    /// cooldown. Used for explicit user-triggered reloads.
    pub fn half_open(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::Open {
            inner.state = CircuitState::HalfOpen;
            inner.trial_in_flight = false;
            self.publish(&inner);
        }
    }

    /// How long until an open breaker would admit a trial, if it is open.
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let inner = self.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let opened_at = inner.opened_at?;
        Some(self.config.cooldown.saturating_sub(opened_at.elapsed()))
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CircuitState> {
        self.state_tx.subscribe()
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.state);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            // No invariant spans a poisoned write; keep serving.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            threshold,
            cooldown,
        })
    }

    #[test]
    fn test_starts_closed_and_admits() {
        let b = CircuitBreaker::default();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_opens_at_threshold() {
        let b = breaker(3, Duration::from_secs(30));
        for _ in 0..2 {
            b.record_failure();
            assert_eq!(b.state(), CircuitState::Closed);
        }
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let b = breaker(3, Duration::from_secs(30));
        b.record_failure();
        b.record_failure();
        b.record_success();

        // The streak is broken; two more failures stay below the threshold.
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn test_cooldown_admits_single_trial() {
        let b = breaker(1, Duration::from_millis(10));
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.try_acquire());

        std::thread::sleep(Duration::from_millis(20));
        assert!(b.try_acquire(), "cooldown elapsed, trial admitted");
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(!b.try_acquire(), "only one trial at a time");
    }

    #[test]
    fn test_half_open_success_closes() {
        let b = breaker(1, Duration::from_millis(5));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(b.try_acquire());

        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let b = breaker(1, Duration::from_millis(5));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(b.try_acquire());

        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.try_acquire(), "cooldown restarted");
    }

    #[test]
    fn test_manual_half_open_bypasses_cooldown() {
        let b = breaker(1, Duration::from_secs(3600));
        b.record_failure();
        assert!(!b.try_acquire());

        b.half_open();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_release_frees_the_trial_slot() {
        let b = breaker(1, Duration::from_millis(5));
        b.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(b.try_acquire());
        assert!(!b.try_acquire());

        b.release();
        assert!(b.try_acquire(), "released trial slot can be re-acquired");
    }

    #[test]
    fn test_cooldown_remaining() {
        let b = breaker(1, Duration::from_secs(30));
        assert_eq!(b.cooldown_remaining(), None);

        b.record_failure();
        let remaining = b.cooldown_remaining().expect("open breaker has a cooldown");
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
    }

    #[test]
    fn test_shared_breaker_groups_failures() {
        use std::sync::Arc;

        let shared = Arc::new(breaker(2, Duration::from_secs(30)));
        let a = Arc::clone(&shared);
        let b = Arc::clone(&shared);

        a.record_failure();
        b.record_failure();

        // A failure in either owner suppresses the whole group.
        assert!(!a.try_acquire());
        assert!(!b.try_acquire());
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let b = breaker(1, Duration::from_secs(30));
        let mut rx = b.subscribe();
        assert_eq!(*rx.borrow(), CircuitState::Closed);

        b.record_failure();
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), CircuitState::Open);
    }
}
