//! The scheduler: phase queues, the tick driver surface, and the
//! current-scheduler stack.
//!
//! A [`Scheduler`] is a cheap cloneable handle over a shared core owning one
//! queue per [`Phase`]. The host drives it by calling
//! [`step`](Scheduler::step) for each phase of its tick, in phase order;
//! routines are started at any time with [`start`](Scheduler::start) and run
//! their first slice synchronously inside that call.
//!
//! While a scheduler is stepping or starting routines it is pushed onto a
//! thread-local stack, so code running inside a routine can reach the
//! scheduler that is driving it through [`Scheduler::current`] without
//! threading a handle through every call. The stack nests: a routine started
//! from inside another routine's step lands on the same scheduler.
//!
//! The whole structure is single-threaded and `!Send`. One scheduler per
//! thread is the expected shape; [`Scheduler::current_or_default`] hands out
//! a per-thread default for hosts that never build their own.

mod queue;
mod routine;

use crate::phase::Phase;
use crate::promise::RoutinePromise;
use crate::routine::{Coroutine, LivenessOracle};
use crate::scheduler::queue::PhaseQueue;
use crate::scheduler::routine::{RoutineBox, StepOutcome};
use core::fmt;
use std::any::type_name;
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;
use tracing::debug;

thread_local! {
    static CURRENT: RefCell<Vec<Scheduler>> = const { RefCell::new(Vec::new()) };
    static DEFAULT: OnceCell<Scheduler> = const { OnceCell::new() };
}

struct Shared {
    queues: [Rc<RefCell<PhaseQueue>>; Phase::COUNT],
    started_hooks: RefCell<Vec<Box<dyn FnMut()>>>,
}

/// Cooperative routine scheduler. Clones share the same queues.
#[derive(Clone)]
pub struct Scheduler {
    shared: Rc<Shared>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("routines", &self.count())
            .finish()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                queues: std::array::from_fn(|i| {
                    Rc::new(RefCell::new(PhaseQueue::new(Phase::ALL[i])))
                }),
                started_hooks: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The scheduler currently stepping or starting a routine on this thread,
    /// if any.
    #[must_use]
    pub fn current() -> Option<Scheduler> {
        CURRENT.with(|stack| stack.borrow().last().cloned())
    }

    /// Like [`current`](Scheduler::current), falling back to a per-thread
    /// default scheduler created on first use.
    #[must_use]
    pub fn current_or_default() -> Scheduler {
        Self::current().unwrap_or_else(|| DEFAULT.with(|cell| cell.get_or_init(Scheduler::new).clone()))
    }

    /// Starts a routine and returns its completion channel.
    ///
    /// The routine is stepped once synchronously; a routine that finishes
    /// without suspending resolves its promise here and never occupies a
    /// queue slot.
    pub fn start<C: Coroutine + 'static>(&self, coroutine: C) -> RoutinePromise {
        self.start_inner(Box::new(coroutine), None, type_name::<C>())
    }

    /// Starts a routine bound to a liveness oracle: it pauses while the bound
    /// entity is inactive and is auto-canceled once the entity is gone.
    pub fn start_bound<L, C>(&self, liveness: L, coroutine: C) -> RoutinePromise
    where
        L: LivenessOracle + 'static,
        C: Coroutine + 'static,
    {
        self.start_inner(Box::new(coroutine), Some(Box::new(liveness)), type_name::<C>())
    }

    fn start_inner(
        &self,
        coroutine: Box<dyn Coroutine>,
        liveness: Option<Box<dyn LivenessOracle>>,
        name: &'static str,
    ) -> RoutinePromise {
        let promise = RoutinePromise::new();
        let mut routine = RoutineBox::new(coroutine, promise.clone(), liveness, name);

        let _scope = CurrentScope::enter(self);
        match routine.step() {
            StepOutcome::Finished => {
                // Resolved on its first slice; nothing to queue.
            }
            StepOutcome::Suspended => {
                debug!(routine = routine.name(), phase = %routine.phase(), "routine enqueued");
                self.queue(routine.phase()).borrow_mut().insert(routine);
                self.notify_started();
            }
        }
        promise
    }

    /// Scans one phase's routines: polls eligible suspensions, steps the
    /// ready ones, then flushes routines whose placement changed into their
    /// destination queues. Hosts call this once per phase per tick, in
    /// [`Phase::ALL`] order; calling it twice in a tick re-polls early.
    pub fn step(&self, phase: Phase) {
        let _scope = CurrentScope::enter(self);
        queue::step(self.queue(phase));
        self.flush_staged(phase);
    }

    /// Reaps canceled and dead-liveness routines across every phase without
    /// polling or stepping anything. For bulk teardown events where waiting
    /// for each routine's next visit is too slow.
    pub fn purge_expired(&self) {
        let _scope = CurrentScope::enter(self);
        for queue in &self.shared.queues {
            queue::purge(queue);
        }
        for phase in Phase::ALL {
            self.flush_staged(phase);
        }
    }

    /// Cancels every routine and empties every queue.
    ///
    /// All queues are drained before any promise is canceled, so a
    /// cancellation listener that starts a replacement routine inserts into
    /// an already-empty, live queue.
    pub fn reset_all(&self) {
        let _scope = CurrentScope::enter(self);
        let mut drained = Vec::new();
        for queue in &self.shared.queues {
            drained.append(&mut queue.borrow_mut().drain_all());
        }
        debug!(routines = drained.len(), "scheduler reset");
        for routine in drained {
            routine.cancel();
        }
    }

    /// Number of live routines across all queues, staged arrivals included.
    #[must_use]
    pub fn count(&self) -> usize {
        self.shared
            .queues
            .iter()
            .map(|queue| queue.borrow().count())
            .sum()
    }

    /// Registers a hook invoked whenever a started routine is actually
    /// enqueued. Hosts that tick on demand use this to schedule the next
    /// tick; routines that finish on their first slice never fire it.
    pub fn on_routine_started(&self, hook: impl FnMut() + 'static) {
        self.shared.started_hooks.borrow_mut().push(Box::new(hook));
    }

    fn queue(&self, phase: Phase) -> &Rc<RefCell<PhaseQueue>> {
        &self.shared.queues[phase.index()]
    }

    fn flush_staged(&self, phase: Phase) {
        let staged = self.queue(phase).borrow_mut().take_staged();
        for routine in staged {
            self.queue(routine.phase()).borrow_mut().insert(routine);
        }
    }

    /// Runs the started hooks. They are swapped out for the duration so a
    /// hook registering another hook does not alias the borrow.
    fn notify_started(&self) {
        let mut hooks = std::mem::take(&mut *self.shared.started_hooks.borrow_mut());
        for hook in &mut hooks {
            hook();
        }
        let mut stored = self.shared.started_hooks.borrow_mut();
        hooks.append(&mut stored);
        *stored = hooks;
    }
}

/// RAII frame on the current-scheduler stack.
struct CurrentScope {
    entered: *const Shared,
}

impl CurrentScope {
    fn enter(scheduler: &Scheduler) -> Self {
        CURRENT.with(|stack| stack.borrow_mut().push(scheduler.clone()));
        Self {
            entered: Rc::as_ptr(&scheduler.shared),
        }
    }
}

impl Drop for CurrentScope {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert!(
                popped.is_some_and(|s| Rc::as_ptr(&s.shared) == self.entered),
                "current-scheduler stack out of balance"
            );
        });
    }
}
