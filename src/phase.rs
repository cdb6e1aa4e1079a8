//! Tick phases.
//!
//! A tick is divided into a fixed sequence of phases; suspended routines name
//! the phase they want to resume on. The host driver is expected to call
//! [`Scheduler::step`](crate::Scheduler::step) once per phase per tick, in
//! [`Phase::ALL`] order.

use core::fmt;

/// A named point within a recurring tick at which routines may resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Phase {
    /// Main per-tick work. The default resumption phase.
    #[default]
    Update,
    /// Immediately after the main update.
    PostUpdate,
    /// The fixed-timestep stage of the tick.
    FixedUpdate,
    /// After all per-tick simulation work.
    LateUpdate,
    /// Just before the host presents the tick's output.
    PreRender,
    /// The final point of the tick.
    EndOfFrame,
}

impl Phase {
    /// Every phase, in the order the host driver steps them each tick.
    pub const ALL: [Phase; 6] = [
        Phase::Update,
        Phase::PostUpdate,
        Phase::FixedUpdate,
        Phase::LateUpdate,
        Phase::PreRender,
        Phase::EndOfFrame,
    ];

    /// Number of phases in a tick.
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this phase in [`Phase::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Phase::Update => "Update",
            Phase::PostUpdate => "PostUpdate",
            Phase::FixedUpdate => "FixedUpdate",
            Phase::LateUpdate => "LateUpdate",
            Phase::PreRender => "PreRender",
            Phase::EndOfFrame => "EndOfFrame",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
