//! Startup gate.
//!
//! Work that arrives before the initial load has finished is held in a
//! FIFO and released, in arrival order, when the gate opens. Nothing waits
//! on a lock; held items simply sit in the buffer.

use std::collections::VecDeque;

/// Where the engine is in its startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// Loading has not begun.
    Uninitialized,
    /// Persisted state and live transfers are being loaded.
    Initializing,
    /// Startup reconciliation is done; work runs immediately.
    Ready,
}

/// Startup gate holding deferred items of type `T`.
#[derive(Debug)]
pub struct InitGate<T> {
    phase: InitPhase,
    deferred: VecDeque<T>,
}

impl<T> Default for InitGate<T> {
    fn default() -> Self {
        Self {
            phase: InitPhase::Uninitialized,
            deferred: VecDeque::new(),
        }
    }
}

impl<T> InitGate<T> {
    /// A closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub const fn phase(&self) -> InitPhase {
        self.phase
    }

    /// Number of held items.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Move from `Uninitialized` to `Initializing`.
    ///
    /// Returns `false` if loading was already started.
    pub fn begin(&mut self) -> bool {
        if self.phase == InitPhase::Uninitialized {
            self.phase = InitPhase::Initializing;
            true
        } else {
            false
        }
    }

    /// Pass `item` through when ready, otherwise hold it.
    pub fn admit(&mut self, item: T) -> Option<T> {
        if self.phase == InitPhase::Ready {
            Some(item)
        } else {
            self.deferred.push_back(item);
            None
        }
    }

    /// Open the gate and hand back everything that was held, oldest first.
    pub fn open(&mut self) -> VecDeque<T> {
        self.phase = InitPhase::Ready;
        std::mem::take(&mut self.deferred)
    }
}
