//! Single-occupancy admission gate

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// The one system-wide slot for an in-flight command
///
/// Admission never waits: a caller either gets the permit or learns the
/// slot is occupied. Cloning shares the same slot.
#[derive(Debug, Clone, Default)]
pub struct CommandSlot {
    inner: Arc<Mutex<()>>,
}

/// Proof of admission; the slot frees when this is dropped
#[derive(Debug)]
pub struct SlotPermit {
    _guard: OwnedMutexGuard<()>,
    admitted_at: Instant,
}

impl CommandSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot if it is free
    pub fn try_acquire(&self) -> Option<SlotPermit> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .ok()
            .map(|guard| SlotPermit {
                _guard: guard,
                admitted_at: Instant::now(),
            })
    }

    /// Whether a command currently holds the slot
    pub fn is_occupied(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

impl SlotPermit {
    /// Milliseconds since admission
    pub fn held_ms(&self) -> u64 {
        self.admitted_at.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let slot = CommandSlot::new();
        let permit = slot.try_acquire();
        assert!(permit.is_some());
        assert!(slot.is_occupied());
        assert!(slot.try_acquire().is_none());
    }

    #[test]
    fn test_drop_releases() {
        let slot = CommandSlot::new();
        let shared = slot.clone();
        drop(slot.try_acquire());
        assert!(!shared.is_occupied());
        assert!(shared.try_acquire().is_some());
    }

    #[test]
    fn test_release_on_panic() {
        let slot = CommandSlot::new();
        let inner = slot.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _permit = inner.try_acquire().unwrap();
            panic!("command blew up");
        }));
        assert!(result.is_err());
        assert!(!slot.is_occupied());
    }
}
