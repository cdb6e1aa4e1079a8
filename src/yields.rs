//! Yield instructions: the values routines suspend on.
//!
//! A [`YieldInstruction`] names the phase a routine resumes on, the earliest
//! timestamp (on one of the two clocks) before which its condition is not
//! even checked, and the condition itself, polled at most once per tick.
//! Defer timestamps are resolved against the current [`time`](crate::time)
//! source when the instruction is built, exactly once — an instruction defers
//! on simulated time or real time, never both, and `0.0` means "no deferral,
//! poll this tick".

use crate::phase::Phase;
use crate::promise::RoutinePromise;
use crate::time;
use crate::util::jitter_unit;
use core::fmt;
use std::cell::Cell;
use std::rc::Rc;

/// A routine's declared resumption condition.
pub struct YieldInstruction {
    phase: Phase,
    defer_sim: f64,
    defer_real: f64,
    kind: YieldKind,
}

enum YieldKind {
    /// Resume the next time the phase is stepped.
    NextTick,
    /// Resume once the defer timestamp passes; the poll itself is trivial.
    ForSeconds,
    /// Countdown over poll calls.
    ForTicks { remaining: u32 },
    /// Resume when the predicate reports true.
    Until(Box<dyn FnMut() -> bool>),
    /// Resume when the watched channel leaves the pending state.
    ForPromise(RoutinePromise),
    /// Fixed-rate repetition; shares its pacing state with the
    /// [`RateYield`] that built it.
    AtRate(Rc<RateState>),
}

impl YieldInstruction {
    fn new(phase: Phase, defer_sim: f64, defer_real: f64, kind: YieldKind) -> Self {
        debug_assert!(
            defer_sim == 0.0 || defer_real == 0.0,
            "an instruction defers on one time basis, never both"
        );
        Self {
            phase,
            defer_sim,
            defer_real,
            kind,
        }
    }

    /// Resume the next time `phase` is stepped.
    #[must_use]
    pub fn next_tick(phase: Phase) -> Self {
        Self::new(phase, 0.0, 0.0, YieldKind::NextTick)
    }

    /// Resume once `seconds` of simulated time have passed.
    #[must_use]
    pub fn wait(seconds: f64, phase: Phase) -> Self {
        debug_assert!(seconds >= 0.0, "cannot wait a negative duration");
        let deadline = time::current().time() + seconds;
        Self::new(phase, deadline, 0.0, YieldKind::ForSeconds)
    }

    /// Resume once `seconds` of real time have passed, regardless of what the
    /// simulated clock does.
    #[must_use]
    pub fn wait_real(seconds: f64, phase: Phase) -> Self {
        debug_assert!(seconds >= 0.0, "cannot wait a negative duration");
        let deadline = time::current().real_time() + seconds;
        Self::new(phase, 0.0, deadline, YieldKind::ForSeconds)
    }

    /// Resume after `phase` has been stepped `ticks` times. Zero behaves like
    /// [`next_tick`](YieldInstruction::next_tick).
    #[must_use]
    pub fn wait_ticks(ticks: u32, phase: Phase) -> Self {
        Self::new(phase, 0.0, 0.0, YieldKind::ForTicks { remaining: ticks })
    }

    /// Resume once `predicate` reports true. Checked once per tick; a
    /// predicate that never fires waits forever.
    #[must_use]
    pub fn until(predicate: impl FnMut() -> bool + 'static, phase: Phase) -> Self {
        Self::new(phase, 0.0, 0.0, YieldKind::Until(Box::new(predicate)))
    }

    /// Resume once `promise` is no longer pending, whatever its outcome.
    #[must_use]
    pub fn wait_for(promise: &RoutinePromise, phase: Phase) -> Self {
        Self::new(phase, 0.0, 0.0, YieldKind::ForPromise(promise.clone()))
    }

    /// Phase the suspended routine resumes on.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Earliest simulated timestamp at which the condition may be polled;
    /// `0.0` means no simulated-time deferral.
    #[must_use]
    pub fn defer_until_sim(&self) -> f64 {
        self.defer_sim
    }

    /// Earliest real timestamp at which the condition may be polled; `0.0`
    /// means no real-time deferral.
    #[must_use]
    pub fn defer_until_real(&self) -> f64 {
        self.defer_real
    }

    /// Checks whether the suspension is over. May mutate internal state, so
    /// the scheduler calls it at most once per tick; hosts normally never
    /// call it at all.
    pub fn poll(&mut self) -> bool {
        match &mut self.kind {
            YieldKind::NextTick | YieldKind::ForSeconds => true,
            YieldKind::ForTicks { remaining } => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            YieldKind::Until(predicate) => predicate(),
            YieldKind::ForPromise(promise) => !promise.is_pending(),
            YieldKind::AtRate(state) => {
                state.record_resume();
                match state.basis {
                    RateBasis::Simulated => self.defer_sim = state.next_poll_time(),
                    RateBasis::Real => self.defer_real = state.next_poll_time(),
                }
                true
            }
        }
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            YieldKind::NextTick => "NextTick",
            YieldKind::ForSeconds => "ForSeconds",
            YieldKind::ForTicks { .. } => "ForTicks",
            YieldKind::Until(_) => "Until",
            YieldKind::ForPromise(_) => "ForPromise",
            YieldKind::AtRate(_) => "AtRate",
        }
    }
}

impl fmt::Debug for YieldInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YieldInstruction")
            .field("phase", &self.phase)
            .field("defer_sim", &self.defer_sim)
            .field("defer_real", &self.defer_real)
            .field("kind", &self.kind_name())
            .finish()
    }
}

/// Which clock a [`RateYield`] paces against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateBasis {
    /// The simulated clock.
    Simulated,
    /// The real clock (the default: pacing usually targets wall time).
    #[default]
    Real,
}

/// Pacing options for [`RateYield::new`].
#[derive(Debug, Clone, Copy)]
pub struct RateOptions {
    /// Offset the first resume by a random fraction of the period, spreading
    /// routines that were all started on the same tick. Defaults to true.
    pub randomize_start: bool,
    /// Clock to pace against. Defaults to [`RateBasis::Real`].
    pub basis: RateBasis,
}

impl Default for RateOptions {
    fn default() -> Self {
        Self {
            randomize_start: true,
            basis: RateBasis::default(),
        }
    }
}

#[derive(Debug)]
struct RateState {
    period: f64,
    first_resume: f64,
    resumes: Cell<u64>,
    basis: RateBasis,
}

impl RateState {
    fn record_resume(&self) {
        self.resumes.set(self.resumes.get() + 1);
    }

    /// Next poll timestamp, always computed from the fixed anchor plus the
    /// resume count — never by accumulating periods, which would compound
    /// rounding error over the routine's life.
    fn next_poll_time(&self) -> f64 {
        self.first_resume + self.resumes.get() as f64 * self.period
    }
}

/// Pacing handle for resuming a routine a fixed number of times per second.
///
/// Built once, kept by the routine, and asked for a fresh instruction at
/// every suspension; the handle carries the anchor timestamp and resume
/// count across yields so the cadence never drifts:
///
/// ```
/// use tickroutines::{Phase, RateBasis, RateOptions, RateYield, Scheduler, Step};
///
/// let scheduler = Scheduler::new();
/// let rate = RateYield::new(10.0, RateOptions { randomize_start: false, basis: RateBasis::Real });
/// scheduler.start(move || {
///     // ... one slice of 10 Hz work ...
///     Ok(Step::Yield(rate.instruction(Phase::Update)))
/// });
/// ```
#[derive(Debug, Clone)]
pub struct RateYield {
    state: Rc<RateState>,
}

impl RateYield {
    /// Creates a pacer targeting `rate_hz` resumes per second.
    ///
    /// `rate_hz` must be positive.
    #[must_use]
    pub fn new(rate_hz: f64, options: RateOptions) -> Self {
        assert!(rate_hz > 0.0, "target rate must be greater than zero");
        let period = 1.0 / rate_hz;
        let offset = if options.randomize_start {
            -jitter_unit() * period
        } else {
            0.0
        };
        let clock = time::current();
        let now = match options.basis {
            RateBasis::Simulated => clock.time(),
            RateBasis::Real => clock.real_time(),
        };
        Self {
            state: Rc::new(RateState {
                period,
                first_resume: now + period + offset,
                resumes: Cell::new(0),
                basis: options.basis,
            }),
        }
    }

    /// The instruction for the next paced suspension on `phase`.
    #[must_use]
    pub fn instruction(&self, phase: Phase) -> YieldInstruction {
        let next = self.state.next_poll_time();
        let (defer_sim, defer_real) = match self.state.basis {
            RateBasis::Simulated => (next, 0.0),
            RateBasis::Real => (0.0, next),
        };
        YieldInstruction::new(phase, defer_sim, defer_real, YieldKind::AtRate(Rc::clone(&self.state)))
    }
}
