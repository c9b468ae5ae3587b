//! Model fallback and circuit breaking.
//!
//! [`FallbackController`] owns the ordered model hierarchy, per-model
//! cooldown expiries, and the consecutive-failure counter that drives the
//! process-wide circuit breaker.  The controller itself is not synchronized;
//! [`crate::brain::Brain`] keeps it behind a mutex so mutations stay
//! single-writer under a threaded runtime.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{BrainError, Result};

/// Ordered model hierarchy with cooldown tracking and a failure counter.
///
/// Advancement through the hierarchy is a one-way ratchet: once the
/// controller moves past a model it does not return to it for the rest of
/// the process lifetime, even after that model's cooldown expires, unless a
/// caller explicitly invokes [`reset_to_first`](Self::reset_to_first).
#[derive(Debug)]
pub struct FallbackController {
    hierarchy: Vec<String>,
    current: usize,
    /// Map of model id → when the cooldown expires.
    cooldowns: HashMap<String, Instant>,
    consecutive_failures: usize,
}

impl FallbackController {
    /// Create a controller over a non-empty hierarchy, starting at the first
    /// entry.
    pub fn new(hierarchy: Vec<String>) -> Result<Self> {
        if hierarchy.is_empty() {
            return Err(BrainError::EmptyHierarchy);
        }
        Ok(Self {
            hierarchy,
            current: 0,
            cooldowns: HashMap::new(),
            consecutive_failures: 0,
        })
    }

    /// The currently selected model.
    pub fn current(&self) -> &str {
        &self.hierarchy[self.current]
    }

    /// Number of models in the hierarchy.
    pub fn hierarchy_len(&self) -> usize {
        self.hierarchy.len()
    }

    /// Advance to the next model in the hierarchy.
    ///
    /// Returns `false` when the hierarchy is exhausted; the selection is
    /// left on the final entry.
    pub fn next_model(&mut self) -> bool {
        if self.current + 1 >= self.hierarchy.len() {
            return false;
        }
        self.current += 1;
        tracing::warn!(model = %self.current(), "falling back to next model");
        true
    }

    /// Return the selection to the first entry of the hierarchy.
    pub fn reset_to_first(&mut self) {
        self.current = 0;
    }

    /// Put a model on cooldown for the given duration.
    pub fn mark_cooldown(&mut self, model: &str, duration: Duration) {
        let expires = Instant::now() + duration;
        tracing::warn!(
            model,
            cooldown_secs = duration.as_secs(),
            "model placed on cooldown"
        );
        self.cooldowns.insert(model.to_owned(), expires);
    }

    /// True while a model's cooldown has not yet expired.  Models without an
    /// entry are never cooling down.
    pub fn is_cooling_down(&self, model: &str) -> bool {
        self.cooldowns
            .get(model)
            .is_some_and(|expires| Instant::now() < *expires)
    }

    /// When the given model's cooldown expires, if one is set.
    pub fn cooldown_expiry(&self, model: &str) -> Option<Instant> {
        self.cooldowns.get(model).copied()
    }

    /// Record a failed exchange.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    /// Record a successful exchange, resetting the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Current consecutive-failure count.
    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Clear the failure streak (used after the circuit-breaker pause).
    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// True once failures span the entire hierarchy.
    pub fn circuit_open(&self) -> bool {
        self.consecutive_failures >= self.hierarchy.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
