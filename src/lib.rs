//! Cooperative, phase-ordered routine scheduling for tick-driven hosts.
//!
//! `tickroutines` lets a host run many long-lived, suspendable routines
//! interleaved across the phases of a recurring tick. A routine is a manually
//! driven state machine ([`Coroutine`]): each resume does a slice of work and
//! either finishes or suspends on a [`YieldInstruction`] naming when and
//! where it wants to run next — the next tick of some phase, after a number
//! of ticks or seconds (simulated or real clock), once a predicate holds,
//! once another routine's promise resolves, or at a fixed rate.
//!
//! The host owns the loop: it advances its clock, then calls
//! [`Scheduler::step`] for each [`Phase`] in order. Nothing runs between
//! steps; routines only ever execute inside a step (or synchronously inside
//! [`Scheduler::start`], which runs the first slice immediately).
//!
//! ```
//! use std::rc::Rc;
//! use tickroutines::time::{self, ManualTimeSource};
//! use tickroutines::{Phase, Scheduler, Step, YieldInstruction};
//!
//! let clock = Rc::new(ManualTimeSource::new());
//! let _time = time::source_scope(clock.clone());
//!
//! let scheduler = Scheduler::new();
//! let mut fired = false;
//! let promise = scheduler.start(move || {
//!     if fired {
//!         Ok(Step::Done)
//!     } else {
//!         fired = true;
//!         Ok(Step::Yield(YieldInstruction::wait(1.0, Phase::Update)))
//!     }
//! });
//!
//! // Drive the tick loop: nothing happens until the deadline passes.
//! scheduler.step(Phase::Update);
//! assert!(promise.is_pending());
//!
//! clock.advance(1.5);
//! scheduler.step(Phase::Update);
//! assert!(promise.has_succeeded());
//! ```
//!
//! Routines can be bound to a [`LivenessOracle`]: they pause while the bound
//! entity is inactive and are auto-canceled once it no longer exists, so a
//! routine never outlives the thing it animates.
//!
//! Everything is single-threaded by design, the completion channel included:
//! promise listeners may capture scheduler handles and other thread-local
//! state, so [`RoutinePromise`] handles stay on the scheduler's thread.

pub mod error;
pub mod phase;
pub mod promise;
pub mod routine;
pub mod scheduler;
pub mod time;
pub mod yields;

mod util;

pub use error::RoutineError;
pub use phase::Phase;
pub use promise::{PromiseState, RoutinePromise};
pub use routine::{Coroutine, LivenessHandle, LivenessOracle, Step};
pub use scheduler::Scheduler;
pub use yields::{RateBasis, RateOptions, RateYield, YieldInstruction};
