//! Single-flight processing state
//!
//! The bridge has two states, Idle and Processing. The only shared bit is
//! the processing flag; it is taken with one atomic compare-exchange and
//! released when the returned guard is dropped, so every exit path of a
//! cycle (error, early return, panic) leaves the bridge Idle again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bridge execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Waiting for a request-file notification
    Idle,

    /// One request is being read, submitted or streamed
    Processing,
}

impl BridgeState {
    /// Human-readable state name
    pub fn display_name(&self) -> &'static str {
        match self {
            BridgeState::Idle => "Idle",
            BridgeState::Processing => "Processing",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Atomic processing flag
///
/// Cloning shares the flag; the bridge hands clones to the event loop and
/// to cycle tasks, never a bare `bool`.
#[derive(Debug, Clone, Default)]
pub struct ProcessingFlag {
    processing: Arc<AtomicBool>,
}

impl ProcessingFlag {
    /// Create a flag in the Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set: Idle → Processing
    ///
    /// Returns `None` when a request is already in flight. Two racing
    /// callers can never both receive a guard.
    pub fn try_acquire(&self) -> Option<ProcessingGuard> {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard {
                processing: Arc::clone(&self.processing),
            })
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Current state derived from the flag
    pub fn state(&self) -> BridgeState {
        if self.is_processing() {
            BridgeState::Processing
        } else {
            BridgeState::Idle
        }
    }
}

/// Proof of holding the processing flag; dropping it returns to Idle
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the processing flag"]
pub struct ProcessingGuard {
    processing: Arc<AtomicBool>,
}

impl ProcessingGuard {
    /// Release explicitly (same as dropping)
    pub fn release(self) {}
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.processing.store(false, Ordering::Release);
    }
}
