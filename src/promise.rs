//! Completion channel for routines.
//!
//! A [`RoutinePromise`] is the result object a routine resolves exactly once:
//! pending until it transitions to succeeded, failed, or canceled. The
//! scheduler is the producer; the host observes the outcome through state
//! queries or per-state listeners. The host may also *request* cancellation
//! through the same handle — the transition to canceled is synchronous, but
//! the scheduler only drops the routine on its next scan visit, never from
//! the caller's stack frame.
//!
//! Handles stay on the scheduler's thread: listeners are free to capture
//! scheduler handles and other thread-local state, which keeps the whole
//! type off the `Send` path.
//!
//! Misuse is contained rather than propagated: completing a channel that is
//! no longer pending is logged and swallowed, and a panicking listener cannot
//! unwind into the scheduler.

use crate::error::RoutineError;
use crate::util::panic_message;
use core::fmt;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Observable state of a [`RoutinePromise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// No outcome yet.
    Pending,
    /// The routine ran to completion.
    Succeeded,
    /// The routine faulted; see [`RoutinePromise::error`].
    Failed,
    /// The routine was canceled, externally or by liveness expiry.
    Canceled,
}

type Listener = Box<dyn FnOnce()>;
type FailureListener = Box<dyn FnOnce(&RoutineError)>;

struct Shared {
    state: PromiseState,
    error: Option<RoutineError>,
    on_success: Vec<Listener>,
    on_failure: Vec<FailureListener>,
    on_cancel: Vec<Listener>,
}

/// Cloneable handle to a routine's completion channel.
pub struct RoutinePromise {
    shared: Arc<Mutex<Shared>>,
}

impl Clone for RoutinePromise {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Debug for RoutinePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutinePromise")
            .field("state", &self.state())
            .finish()
    }
}

impl Default for RoutinePromise {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutinePromise {
    /// Creates a pending promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: PromiseState::Pending,
                error: None,
                on_success: Vec::new(),
                on_failure: Vec::new(),
                on_cancel: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn state(&self) -> PromiseState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    #[must_use]
    pub fn has_succeeded(&self) -> bool {
        self.state() == PromiseState::Succeeded
    }

    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.state() == PromiseState::Failed
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.state() == PromiseState::Canceled
    }

    /// The failure, if the promise has failed.
    #[must_use]
    pub fn error(&self) -> Option<RoutineError> {
        self.shared.lock().error.clone()
    }

    /// Resolves the promise to succeeded and notifies success listeners.
    ///
    /// Completing a non-pending promise is a producer bug; it is logged and
    /// ignored so one misbehaving routine cannot take the scheduler down.
    pub fn complete(&self) {
        let listeners = {
            let mut shared = self.shared.lock();
            if shared.state != PromiseState::Pending {
                drop(shared);
                error!(state = ?self.state(), "complete() on a promise that is no longer pending");
                return;
            }
            shared.state = PromiseState::Succeeded;
            shared.on_failure.clear();
            shared.on_cancel.clear();
            std::mem::take(&mut shared.on_success)
        };
        for listener in listeners {
            run_listener(listener);
        }
    }

    /// Resolves the promise to failed with `error` and notifies failure
    /// listeners. Logged and ignored if no longer pending.
    pub fn fail(&self, error: RoutineError) {
        let (listeners, error) = {
            let mut shared = self.shared.lock();
            if shared.state != PromiseState::Pending {
                drop(shared);
                error!(state = ?self.state(), "fail() on a promise that is no longer pending");
                return;
            }
            shared.state = PromiseState::Failed;
            shared.error = Some(error.clone());
            shared.on_success.clear();
            shared.on_cancel.clear();
            (std::mem::take(&mut shared.on_failure), error)
        };
        for listener in listeners {
            run_failure_listener(listener, &error);
        }
    }

    /// Requests cancellation: transitions a pending promise to canceled
    /// synchronously and notifies cancellation listeners. The owning routine
    /// is dropped by the scheduler on its next scan visit.
    ///
    /// Canceling an already-canceled promise is a contract violation (debug
    /// assertion); canceling a completed or failed one is logged and ignored.
    pub fn cancel(&self) {
        let listeners = {
            let mut shared = self.shared.lock();
            match shared.state {
                PromiseState::Pending => {
                    shared.state = PromiseState::Canceled;
                    shared.on_success.clear();
                    shared.on_failure.clear();
                    std::mem::take(&mut shared.on_cancel)
                }
                PromiseState::Canceled => {
                    drop(shared);
                    debug_assert!(false, "cancel() on an already-canceled promise");
                    warn!("cancel() on an already-canceled promise");
                    return;
                }
                state => {
                    drop(shared);
                    warn!(?state, "cancel() on a promise that already resolved");
                    return;
                }
            }
        };
        for listener in listeners {
            run_listener(listener);
        }
    }

    /// Registers a listener for the succeeded state. Runs immediately if the
    /// promise already succeeded.
    pub fn on_success(&self, listener: impl FnOnce() + 'static) {
        let immediate = {
            let mut shared = self.shared.lock();
            match shared.state {
                PromiseState::Pending => {
                    shared.on_success.push(Box::new(listener));
                    None
                }
                PromiseState::Succeeded => Some(listener),
                _ => None,
            }
        };
        if let Some(listener) = immediate {
            run_listener(Box::new(listener));
        }
    }

    /// Registers a listener for the failed state. Runs immediately if the
    /// promise already failed.
    pub fn on_failure(&self, listener: impl FnOnce(&RoutineError) + 'static) {
        let immediate = {
            let mut shared = self.shared.lock();
            match shared.state {
                PromiseState::Pending => {
                    shared.on_failure.push(Box::new(listener));
                    None
                }
                PromiseState::Failed => shared.error.clone().map(|err| (listener, err)),
                _ => None,
            }
        };
        if let Some((listener, error)) = immediate {
            run_failure_listener(Box::new(listener), &error);
        }
    }

    /// Registers a listener for the canceled state. Runs immediately if the
    /// promise is already canceled.
    pub fn on_cancel(&self, listener: impl FnOnce() + 'static) {
        let immediate = {
            let mut shared = self.shared.lock();
            match shared.state {
                PromiseState::Pending => {
                    shared.on_cancel.push(Box::new(listener));
                    None
                }
                PromiseState::Canceled => Some(listener),
                _ => None,
            }
        };
        if let Some(listener) = immediate {
            run_listener(Box::new(listener));
        }
    }
}

fn run_listener(listener: Listener) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(listener)) {
        error!(panic = %panic_message(&*payload), "promise listener panicked");
    }
}

fn run_failure_listener(listener: FailureListener, error: &RoutineError) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(error))) {
        error!(panic = %panic_message(&*payload), "promise listener panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn starts_pending_and_transitions_once() {
        let promise = RoutinePromise::new();
        assert!(promise.is_pending());

        promise.complete();
        assert!(promise.has_succeeded());

        // A second resolution is swallowed, not applied.
        promise.fail(RoutineError::msg("late"));
        assert!(promise.has_succeeded());
        assert!(promise.error().is_none());
    }

    #[test]
    fn failure_carries_the_error() {
        let promise = RoutinePromise::new();
        promise.fail(RoutineError::msg("broke"));
        assert!(promise.has_failed());
        assert_eq!(promise.error().unwrap().to_string(), "broke");
    }

    #[test]
    fn cancel_is_synchronous() {
        let promise = RoutinePromise::new();
        promise.cancel();
        assert!(promise.is_canceled());
    }

    #[test]
    fn listeners_fire_on_transition() {
        let promise = RoutinePromise::new();
        let hits = Rc::new(Cell::new(0));

        let counter = hits.clone();
        promise.on_success(move || counter.set(counter.get() + 1));
        promise.on_cancel(|| panic!("wrong terminal state"));

        promise.complete();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn late_listener_registration_fires_immediately() {
        let promise = RoutinePromise::new();
        promise.fail(RoutineError::msg("gone"));

        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        promise.on_failure(move |err| {
            assert_eq!(err.to_string(), "gone");
            flag.set(true);
        });
        assert!(seen.get());
    }

    #[test]
    fn listener_for_other_state_never_fires() {
        let promise = RoutinePromise::new();
        promise.cancel();
        promise.on_success(|| panic!("promise was canceled, not completed"));
        promise.on_failure(|_| panic!("promise was canceled, not failed"));
    }

    #[test]
    fn panicking_listener_is_contained() {
        let promise = RoutinePromise::new();
        let hits = Rc::new(Cell::new(0));

        promise.on_success(|| panic!("listener bug"));
        let counter = hits.clone();
        promise.on_success(move || counter.set(counter.get() + 1));

        promise.complete();
        assert!(promise.has_succeeded());
        assert_eq!(hits.get(), 1, "later listeners still run");
    }
}
