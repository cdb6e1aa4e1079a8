//! The scheduler's owned view of a running routine.

use crate::error::RoutineError;
use crate::phase::Phase;
use crate::promise::RoutinePromise;
use crate::routine::{Coroutine, LivenessOracle, Step};
use crate::util::panic_message;
use crate::yields::YieldInstruction;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

/// Outcome of driving a routine one step.
pub(crate) enum StepOutcome {
    /// The routine suspended again; its new instruction is stored.
    Suspended,
    /// The routine finished (completed, failed, or panicked) and must be
    /// dropped from its queue.
    Finished,
}

/// A routine the scheduler owns: the stepper, its completion channel, the
/// optional liveness binding, and the instruction it is suspended on.
pub(crate) struct RoutineBox {
    coroutine: Box<dyn Coroutine>,
    promise: RoutinePromise,
    liveness: Option<Box<dyn LivenessOracle>>,
    current_yield: Option<YieldInstruction>,
    name: &'static str,
}

impl RoutineBox {
    pub(crate) fn new(
        coroutine: Box<dyn Coroutine>,
        promise: RoutinePromise,
        liveness: Option<Box<dyn LivenessOracle>>,
        name: &'static str,
    ) -> Self {
        Self {
            coroutine,
            promise,
            liveness,
            current_yield: None,
            name,
        }
    }

    pub(crate) fn promise(&self) -> &RoutinePromise {
        &self.promise
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// The phase the routine is currently suspended on, or the default for a
    /// routine that has not yielded yet.
    pub(crate) fn phase(&self) -> Phase {
        self.current_yield
            .as_ref()
            .map_or_else(Phase::default, YieldInstruction::phase)
    }

    pub(crate) fn defer_until_sim(&self) -> f64 {
        self.current_yield
            .as_ref()
            .map_or(0.0, YieldInstruction::defer_until_sim)
    }

    pub(crate) fn defer_until_real(&self) -> f64 {
        self.current_yield
            .as_ref()
            .map_or(0.0, YieldInstruction::defer_until_real)
    }

    /// Paused routines stay suspended without being polled: the bound entity
    /// still exists but is inactive.
    pub(crate) fn is_paused(&self) -> bool {
        self.liveness
            .as_ref()
            .is_some_and(|oracle| oracle.exists() && !oracle.is_active())
    }

    /// The bound entity is gone; the routine must be canceled on this visit.
    pub(crate) fn should_auto_cancel(&self) -> bool {
        self.liveness
            .as_ref()
            .is_some_and(|oracle| !oracle.exists())
    }

    /// Polls the stored instruction. A routine with no instruction (freshly
    /// started) is always ready.
    pub(crate) fn poll_current(&mut self) -> bool {
        self.current_yield
            .as_mut()
            .map_or(true, YieldInstruction::poll)
    }

    /// Cancels the routine's promise if it is still pending. Used for
    /// auto-cancel and bulk resets, where an already-resolved promise just
    /// means the host raced us to it.
    pub(crate) fn cancel(&self) {
        if self.promise.is_pending() {
            self.promise.cancel();
        }
    }

    /// Drives the routine one step, resolving the promise on completion,
    /// failure, or panic. Panics are contained here so a faulting stepper
    /// takes down its own routine and nothing else.
    pub(crate) fn step(&mut self) -> StepOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| self.coroutine.resume()));
        match result {
            Ok(Ok(Step::Yield(instruction))) => {
                self.current_yield = Some(instruction);
                StepOutcome::Suspended
            }
            Ok(Ok(Step::Again)) => {
                // Yield-nothing fallback: resume next tick on whatever phase
                // the routine is already scheduled on.
                self.current_yield = Some(YieldInstruction::next_tick(self.phase()));
                StepOutcome::Suspended
            }
            Ok(Ok(Step::Done)) => {
                debug!(routine = self.name, "routine completed");
                self.promise.complete();
                StepOutcome::Finished
            }
            Ok(Err(error)) => {
                error!(routine = self.name, %error, "routine failed");
                self.promise.fail(error);
                StepOutcome::Finished
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!(routine = self.name, panic = %message, "routine panicked");
                self.promise.fail(RoutineError::panicked(message));
                StepOutcome::Finished
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::LivenessHandle;

    fn boxed(stepper: impl FnMut() -> Result<Step, RoutineError> + 'static) -> Box<dyn Coroutine> {
        Box::new(stepper)
    }

    #[test]
    fn done_completes_the_promise() {
        let mut routine = RoutineBox::new(
            boxed(|| Ok(Step::Done)),
            RoutinePromise::new(),
            None,
            "done",
        );
        assert!(matches!(routine.step(), StepOutcome::Finished));
        assert!(routine.promise().has_succeeded());
    }

    #[test]
    fn yield_stores_the_instruction() {
        let mut routine = RoutineBox::new(
            boxed(|| Ok(Step::Yield(YieldInstruction::next_tick(Phase::LateUpdate)))),
            RoutinePromise::new(),
            None,
            "yields",
        );
        assert!(matches!(routine.step(), StepOutcome::Suspended));
        assert_eq!(routine.phase(), Phase::LateUpdate);
        assert!(routine.promise().is_pending());
    }

    #[test]
    fn again_reuses_the_current_phase() {
        let mut yielded = false;
        let mut routine = RoutineBox::new(
            boxed(move || {
                if yielded {
                    Ok(Step::Again)
                } else {
                    yielded = true;
                    Ok(Step::Yield(YieldInstruction::next_tick(Phase::PreRender)))
                }
            }),
            RoutinePromise::new(),
            None,
            "again",
        );
        routine.step();
        routine.step();
        assert_eq!(routine.phase(), Phase::PreRender);
    }

    #[test]
    fn error_fails_the_promise() {
        let mut routine = RoutineBox::new(
            boxed(|| Err(RoutineError::msg("boom"))),
            RoutinePromise::new(),
            None,
            "fails",
        );
        assert!(matches!(routine.step(), StepOutcome::Finished));
        assert!(routine.promise().has_failed());
    }

    #[test]
    fn panic_is_contained_and_fails_the_promise() {
        let mut routine = RoutineBox::new(
            boxed(|| panic!("stepper bug")),
            RoutinePromise::new(),
            None,
            "panics",
        );
        assert!(matches!(routine.step(), StepOutcome::Finished));
        let error = routine.promise().error().unwrap();
        assert!(error.to_string().contains("stepper bug"));
    }

    #[test]
    fn liveness_drives_pause_and_auto_cancel() {
        let handle = LivenessHandle::new();
        let routine = RoutineBox::new(
            boxed(|| Ok(Step::Done)),
            RoutinePromise::new(),
            Some(Box::new(handle.clone())),
            "bound",
        );

        assert!(!routine.is_paused());
        assert!(!routine.should_auto_cancel());

        handle.set_active(false);
        assert!(routine.is_paused());
        assert!(!routine.should_auto_cancel());

        handle.kill();
        assert!(!routine.is_paused(), "a dead entity is not merely paused");
        assert!(routine.should_auto_cancel());
    }
}
