//! Shared pending stimulus tag
//!
//! The stimulus channel publishes codes here from its receive thread and the
//! recording writer consumes them from the capture loop. The cell is a single
//! atomic word: reads are never torn, the last publish wins, and `take`
//! clears the tag in the same operation that reads it.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::types::NO_STIMULUS;

/// Atomic cell holding the stimulus code for the next record
#[derive(Debug, Default)]
pub struct StimulusState {
    pending: AtomicI32,
}

impl StimulusState {
    /// Create an empty state (no pending tag)
    pub fn new() -> Self {
        Self {
            pending: AtomicI32::new(NO_STIMULUS),
        }
    }

    /// Publish a tag, replacing any unconsumed one
    pub fn set(&self, code: i32) {
        let previous = self.pending.swap(code, Ordering::AcqRel);
        if previous != NO_STIMULUS && previous != code {
            tracing::debug!("Stimulus {} overwritten by {} before being recorded", previous, code);
        }
    }

    /// Read and clear the pending tag in one step
    pub fn take(&self) -> i32 {
        self.pending.swap(NO_STIMULUS, Ordering::AcqRel)
    }

    /// Current pending tag without consuming it
    pub fn peek(&self) -> i32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Check if a tag is waiting for the next record
    pub fn is_pending(&self) -> bool {
        self.peek() != NO_STIMULUS
    }

    /// Put a taken tag back unless a newer one arrived meanwhile
    ///
    /// Returns `true` if the tag was restored.
    pub fn restore(&self, code: i32) -> bool {
        self.pending
            .compare_exchange(NO_STIMULUS, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_clears() {
        let state = StimulusState::new();
        assert!(!state.is_pending());
        state.set(12);
        assert!(state.is_pending());
        assert_eq!(state.take(), 12);
        assert_eq!(state.take(), NO_STIMULUS);
    }

    #[test]
    fn test_last_write_wins() {
        let state = StimulusState::new();
        state.set(1);
        state.set(2);
        assert_eq!(state.take(), 2);
    }

    #[test]
    fn test_restore_only_when_empty() {
        let state = StimulusState::new();
        assert!(state.restore(5));
        assert_eq!(state.peek(), 5);

        state.set(9);
        assert!(!state.restore(5));
        assert_eq!(state.peek(), 9);
    }

    #[test]
    fn test_concurrent_set_never_tears() {
        let k1 = 0x0000_FFFF;
        let k2 = 0x7FFF_0000;
        for _ in 0..200 {
            let state = Arc::new(StimulusState::new());
            let a = {
                let state = state.clone();
                thread::spawn(move || state.set(k1))
            };
            let b = {
                let state = state.clone();
                thread::spawn(move || state.set(k2))
            };
            a.join().unwrap();
            b.join().unwrap();

            let taken = state.take();
            assert!(taken == k1 || taken == k2, "unexpected tag {taken:#x}");
        }
    }
}
