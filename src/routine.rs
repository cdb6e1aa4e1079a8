//! The routine contract: steppers, suspension values, and liveness.
//!
//! A routine is a manually driven state machine. The scheduler calls
//! [`Coroutine::resume`] once per eligible visit; the routine does a slice of
//! work and answers with a [`Step`]: suspend with an explicit
//! [`YieldInstruction`], suspend with the fallback instruction, or finish.
//! Failures are ordinary `Result` errors (or panics, which the scheduler
//! catches at the same boundary).
//!
//! Closures implement [`Coroutine`] directly, so the common case reads:
//!
//! ```
//! use tickroutines::{Phase, Scheduler, Step, YieldInstruction};
//!
//! let scheduler = Scheduler::new();
//! let mut remaining = 3;
//! scheduler.start(move || {
//!     remaining -= 1;
//!     if remaining == 0 {
//!         Ok(Step::Done)
//!     } else {
//!         Ok(Step::Yield(YieldInstruction::next_tick(Phase::Update)))
//!     }
//! });
//! ```

use crate::error::RoutineError;
use crate::yields::YieldInstruction;
use std::cell::Cell;
use std::rc::Rc;

/// What a routine does after one slice of work.
#[derive(Debug)]
pub enum Step {
    /// Suspend until the instruction's condition holds.
    Yield(YieldInstruction),

    /// Suspend without naming a condition: resume next tick, on the phase the
    /// routine is currently scheduled on.
    ///
    /// This mirrors the yield-nothing fallback of classic coroutine APIs.
    /// Prefer an explicit [`Step::Yield`]; `Again` exists for terse loops and
    /// can silently mask a forgotten instruction.
    Again,

    /// The routine has run to completion.
    Done,
}

/// A suspendable unit of work, driven one [`resume`](Coroutine::resume) at a
/// time by the scheduler.
pub trait Coroutine {
    /// Performs the next slice of work.
    ///
    /// Returning `Err` (or panicking) fails the routine's completion channel
    /// and the routine is never resumed again.
    fn resume(&mut self) -> Result<Step, RoutineError>;
}

impl<F> Coroutine for F
where
    F: FnMut() -> Result<Step, RoutineError>,
{
    fn resume(&mut self) -> Result<Step, RoutineError> {
        (self)()
    }
}

/// External liveness queried for a routine bound to some host entity.
///
/// The two queries are independent: an entity may exist but be inactive
/// (routine paused, resumed later from the same suspension point), or be gone
/// entirely (routine auto-canceled on its next visit).
pub trait LivenessOracle {
    /// Does the underlying entity still exist?
    fn exists(&self) -> bool;

    /// Is it currently active? Only meaningful while it exists.
    fn is_active(&self) -> bool;
}

/// A shared-cell [`LivenessOracle`] for hosts without a richer entity model.
///
/// Clone the handle, hand one copy to
/// [`Scheduler::start_bound`](crate::Scheduler::start_bound), and flip the
/// flags from the host side.
#[derive(Debug, Clone, Default)]
pub struct LivenessHandle {
    inner: Rc<LivenessState>,
}

#[derive(Debug)]
struct LivenessState {
    alive: Cell<bool>,
    active: Cell<bool>,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self {
            alive: Cell::new(true),
            active: Cell::new(true),
        }
    }
}

impl LivenessHandle {
    /// Creates a handle that is alive and active.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the entity as paused (`false`) or running (`true`).
    pub fn set_active(&self, active: bool) {
        self.inner.active.set(active);
    }

    /// Marks the entity as destroyed. Irreversible from the scheduler's point
    /// of view: bound routines are auto-canceled on their next visit.
    pub fn kill(&self) {
        self.inner.alive.set(false);
    }
}

impl LivenessOracle for LivenessHandle {
    fn exists(&self) -> bool {
        self.inner.alive.get()
    }

    fn is_active(&self) -> bool {
        self.inner.active.get()
    }
}
