//! Per-property circuit breaker (spec §4.6: "If the authentication error
//! rate for a property exceeds an operator-defined threshold within a
//! rolling window, auto-retry is suspended for that property until
//! reset"). Closed/open/half-open state machine ported near-verbatim
//! from the teacher's endpoint circuit breaker, keyed by property
//! instead of by endpoint URL and tripped on authentication failures
//! specifically rather than on any failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use htng_common::PropertyId;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct PropertyBreaker {
    state: RwLock<BreakerState>,
    last_trip: RwLock<Option<Instant>>,
    recent: RwLock<Vec<bool>>,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
    window: usize,
}

impl PropertyBreaker {
    fn new(failure_threshold: u32, success_threshold: u32, reset_timeout: Duration, window: usize) -> Self {
        Self {
            state: RwLock::new(BreakerState::Closed),
            last_trip: RwLock::new(None),
            recent: RwLock::new(Vec::with_capacity(window)),
            failure_threshold,
            success_threshold,
            reset_timeout,
            window,
        }
    }

    fn record(&self, success: bool) {
        let mut recent = self.recent.write();
        if recent.len() >= self.window {
            recent.remove(0);
        }
        recent.push(success);

        let state = *self.state.read();
        if success {
            if state == BreakerState::HalfOpen {
                let successes = recent.iter().rev().take(self.success_threshold as usize).filter(|s| **s).count() as u32;
                if successes >= self.success_threshold {
                    *self.state.write() = BreakerState::Closed;
                }
            }
        } else {
            *self.last_trip.write() = Some(Instant::now());
            match state {
                BreakerState::Closed => {
                    let failures = recent.iter().rev().take(self.window).filter(|s| !**s).count() as u32;
                    if failures >= self.failure_threshold {
                        *self.state.write() = BreakerState::Open;
                    }
                }
                BreakerState::HalfOpen => *self.state.write() = BreakerState::Open,
                BreakerState::Open => {}
            }
        }
    }

    fn allow(&self) -> bool {
        match *self.state.read() {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let ready = self.last_trip.read().map(|t| t.elapsed() >= self.reset_timeout).unwrap_or(false);
                if ready {
                    *self.state.write() = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn reset(&self) {
        *self.state.write() = BreakerState::Closed;
        *self.last_trip.write() = None;
        self.recent.write().clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
    pub window: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(300),
            window: 20,
        }
    }
}

/// Tracks one breaker per property, created lazily on first use.
pub struct PropertyCircuitBreakerRegistry {
    breakers: RwLock<HashMap<PropertyId, Arc<PropertyBreaker>>>,
    config: CircuitBreakerConfig,
}

impl PropertyCircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { breakers: RwLock::new(HashMap::new()), config }
    }

    fn get_or_create(&self, property_id: PropertyId) -> Arc<PropertyBreaker> {
        if let Some(b) = self.breakers.read().get(&property_id) {
            return Arc::clone(b);
        }
        let mut breakers = self.breakers.write();
        let breaker = Arc::new(PropertyBreaker::new(
            self.config.failure_threshold,
            self.config.success_threshold,
            self.config.reset_timeout,
            self.config.window,
        ));
        breakers.insert(property_id, Arc::clone(&breaker));
        breaker
    }

    /// Whether auto-retry for `property_id` is currently allowed.
    pub fn allow_auto_retry(&self, property_id: PropertyId) -> bool {
        self.get_or_create(property_id).allow()
    }

    pub fn record_authentication_success(&self, property_id: PropertyId) {
        self.get_or_create(property_id).record(true);
    }

    pub fn record_authentication_failure(&self, property_id: PropertyId) {
        self.get_or_create(property_id).record(false);
    }

    pub fn state(&self, property_id: PropertyId) -> BreakerState {
        *self.get_or_create(property_id).state.read()
    }

    pub fn reset(&self, property_id: PropertyId) {
        if let Some(b) = self.breakers.read().get(&property_id) {
            b.reset();
        }
    }
}

impl Default for PropertyCircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_authentication_failures() {
        let registry = PropertyCircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout: Duration::from_millis(50),
            window: 10,
        });

        assert!(registry.allow_auto_retry(1));
        registry.record_authentication_failure(1);
        registry.record_authentication_failure(1);
        assert!(registry.allow_auto_retry(1));
        registry.record_authentication_failure(1);
        assert!(!registry.allow_auto_retry(1));
        assert_eq!(registry.state(1), BreakerState::Open);
    }

    #[test]
    fn other_properties_are_unaffected() {
        let registry = PropertyCircuitBreakerRegistry::default();
        for _ in 0..10 {
            registry.record_authentication_failure(1);
        }
        assert!(!registry.allow_auto_retry(1));
        assert!(registry.allow_auto_retry(2));
    }

    #[test]
    fn manual_reset_closes_breaker() {
        let registry = PropertyCircuitBreakerRegistry::default();
        for _ in 0..10 {
            registry.record_authentication_failure(1);
        }
        assert!(!registry.allow_auto_retry(1));
        registry.reset(1);
        assert_eq!(registry.state(1), BreakerState::Closed);
    }
}
