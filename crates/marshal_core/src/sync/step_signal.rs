//! # Step Signal
//!
//! Counting semaphore raised once per completed step.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Counting signal with zero initial permits.
///
/// ## Usage
///
/// ```rust,ignore
/// let signal = Arc::new(StepSignal::new());
///
/// // Worker, after each step
/// signal.post();
///
/// // Main thread, at sync time
/// if !signal.wait() {
///     // the worker is gone
/// }
/// ```
#[derive(Debug, Default)]
pub struct StepSignal {
    state: Mutex<SignalState>,
    raised: Condvar,
}

#[derive(Debug, Default)]
struct SignalState {
    permits: usize,
    closed: bool,
}

impl StepSignal {
    /// Creates a signal with no permits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one permit and wakes one waiter.
    pub fn post(&self) {
        self.state.lock().permits += 1;
        self.raised.notify_one();
    }

    /// Blocks until a permit is available, then consumes it.
    ///
    /// Returns false once the signal is closed and no permit is left; no
    /// further post will ever arrive.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while state.permits == 0 {
            if state.closed {
                return false;
            }
            self.raised.wait(&mut state);
        }
        state.permits -= 1;
        true
    }

    /// Like `wait`, but gives up after `timeout`.
    ///
    /// Returns true if a permit was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        while state.permits == 0 {
            if state.closed {
                return false;
            }
            if self.raised.wait_for(&mut state, timeout).timed_out() {
                if state.permits == 0 {
                    return false;
                }
                break;
            }
        }
        state.permits -= 1;
        true
    }

    /// Consumes a permit if one is available. Never blocks.
    pub fn try_wait(&self) -> bool {
        let mut state = self.state.lock();
        if state.permits == 0 {
            return false;
        }
        state.permits -= 1;
        true
    }

    /// Marks the poster as gone and wakes every waiter.
    ///
    /// Permits already posted can still be consumed.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.raised.notify_all();
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Permits posted but not yet consumed.
    #[must_use]
    pub fn permits(&self) -> usize {
        self.state.lock().permits
    }
}
