//! Blocking admission gate.
//!
//! The gate wraps a [`RateWindow`] in a single mutex. Callers that find the
//! window saturated park on a condition variable for exactly the time left
//! in the window; the wait releases the mutex so other callers can reset the
//! window or take free slots meanwhile.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::window::{Decision, RateLimit, RateWindow};

/// Proof that a caller was admitted into a window.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    /// Start of the window the caller was admitted into
    pub window_start: Instant,
    /// Position within that window (1-based)
    pub position: u32,
    /// How long the caller was blocked before admission
    pub waited: Duration,
    /// Wall-clock time of the admission
    pub admitted_at: DateTime<Utc>,
}

/// State guarded by the gate's mutex.
struct GateState<S> {
    window: RateWindow,
    closed: bool,
    shared: S,
}

/// A rate limiter that blocks callers instead of rejecting them.
///
/// `S` is extra state that must be mutated under the same lock as the
/// window, such as submission statistics.
pub struct AdmissionGate<S = ()> {
    state: Mutex<GateState<S>>,
    wakeup: Condvar,
}

impl<S: Default> AdmissionGate<S> {
    /// Create a gate whose first window starts now.
    pub fn new(limit: RateLimit) -> Self {
        Self::with_shared(limit, S::default())
    }
}

impl<S> AdmissionGate<S> {
    /// Create a gate carrying `shared` alongside the window.
    pub fn with_shared(limit: RateLimit, shared: S) -> Self {
        Self {
            state: Mutex::new(GateState {
                window: RateWindow::new(limit, Instant::now()),
                closed: false,
                shared,
            }),
            wakeup: Condvar::new(),
        }
    }

    /// Block until a slot is available in the current window and take it.
    ///
    /// Returns `None` if the gate is closed before a slot is granted. A
    /// caller released by [`close`](Self::close) is never admitted.
    pub fn admit(&self) -> Option<Admission> {
        self.admit_with(|_| {})
    }

    /// Like [`admit`](Self::admit), but runs `on_admit` on the shared state
    /// in the same critical section that takes the slot.
    pub fn admit_with(&self, on_admit: impl FnOnce(&mut S)) -> Option<Admission> {
        let started = Instant::now();
        let mut state = self.lock();

        loop {
            if state.closed {
                debug!(waited = ?started.elapsed(), "Gate closed, abandoning admission");
                return None;
            }

            match state.window.try_admit(Instant::now()) {
                Decision::Admit {
                    window_start,
                    position,
                } => {
                    let waited = started.elapsed();
                    trace!(position, waited = ?waited, "Admitted");
                    on_admit(&mut state.shared);
                    return Some(Admission {
                        window_start,
                        position,
                        waited,
                        admitted_at: Utc::now(),
                    });
                }
                Decision::Wait(remaining) => {
                    debug!(
                        remaining = ?remaining,
                        ceiling = state.window.limit().ceiling(),
                        "Window saturated, waiting"
                    );
                    // Timeouts, notifications and spurious wakeups all loop
                    // back to a fresh check.
                    self.wakeup.wait_for(&mut state, remaining);
                }
            }
        }
    }

    /// Close the gate and wake every blocked caller.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.wakeup.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Run `f` on the shared state under the gate's lock.
    pub fn with_shared_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.lock().shared)
    }

    /// Admissions counted in the current window.
    pub fn current_count(&self) -> u32 {
        self.lock().window.current_count(Instant::now())
    }

    /// Admissions still available in the current window.
    pub fn remaining(&self) -> u32 {
        self.lock().window.remaining(Instant::now())
    }

    /// Time left until the current window ends.
    pub fn duration_until_reset(&self) -> Duration {
        self.lock().window.duration_until_reset(Instant::now())
    }

    /// The limit this gate enforces.
    pub fn limit(&self) -> RateLimit {
        self.lock().window.limit()
    }

    fn lock(&self) -> MutexGuard<'_, GateState<S>> {
        self.state.lock()
    }
}

impl<S: Clone> AdmissionGate<S> {
    /// Copy of the shared state.
    pub fn shared(&self) -> S {
        self.lock().shared.clone()
    }
}
