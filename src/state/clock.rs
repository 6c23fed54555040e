//! Animation tick counter shared between the animator and the store

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic tick counter
///
/// The overlay animator is the only caller of [`TickClock::advance`]; every
/// other holder only reads it. Cloning shares the same counter.
#[derive(Debug, Clone, Default)]
pub struct TickClock {
    ticks: Arc<AtomicU64>,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advance by one tick and return the new value
    pub fn advance(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }
}
