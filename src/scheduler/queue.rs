//! Per-phase routine storage and the scan algorithm.
//!
//! Each phase owns three slot collections — immediate, deferred on simulated
//! time, deferred on real time — so a scan never has to inspect timestamps it
//! already knows cannot have elapsed. Routines whose placement changes while
//! the scan runs are parked in staging buffers keyed by destination phase and
//! slot; the scheduler flushes them once the phase's scan is over, so a live
//! slot collection is never mutated underneath its own iteration.
//!
//! Every piece of user code a visit can run (liveness oracles, predicates,
//! steppers, promise listeners) executes while the routine is *in transit*:
//! owned by the visit, its slot reserved, and no `RefCell` borrow held. That
//! is what makes it legal for a routine to call back into the scheduler —
//! starting a sibling, canceling a promise — from inside its own step.

use crate::error::RoutineError;
use crate::phase::Phase;
use crate::scheduler::routine::{RoutineBox, StepOutcome};
use crate::time;
use crate::util::{panic_message, SlotVec};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{error, trace, warn};

/// Which of the three slot collections a routine belongs in, derived from its
/// current instruction's defer timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Immediate,
    DeferredSim,
    DeferredReal,
}

impl SlotKind {
    const ALL: [SlotKind; 3] = [
        SlotKind::Immediate,
        SlotKind::DeferredSim,
        SlotKind::DeferredReal,
    ];

    const fn index(self) -> usize {
        match self {
            SlotKind::Immediate => 0,
            SlotKind::DeferredSim => 1,
            SlotKind::DeferredReal => 2,
        }
    }

    fn for_routine(routine: &RoutineBox) -> Self {
        if routine.defer_until_sim() > 0.0 {
            SlotKind::DeferredSim
        } else if routine.defer_until_real() > 0.0 {
            SlotKind::DeferredReal
        } else {
            SlotKind::Immediate
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum ScanMode {
    /// Normal tick scan: gate, poll, step.
    Full,
    /// Reap canceled and dead-liveness routines only; never poll or step.
    ExpireOnly,
}

/// What a single visit decided about the routine it owns.
enum Visit {
    /// Back into its slot, order preserved.
    Keep(RoutineBox),
    /// Finished or canceled; the slot is freed.
    Remove,
    /// Still live but its placement changed; goes to staging.
    Restage(RoutineBox),
}

type StagingBucket = SmallVec<[RoutineBox; 2]>;

/// All routines scheduled on one phase.
pub(crate) struct PhaseQueue {
    phase: Phase,
    slots: [SlotVec<RoutineBox>; 3],
    /// Staged arrivals keyed by destination phase, then destination slot.
    staging: Vec<[StagingBucket; 3]>,
    /// Set for the duration of a scan; insertions while set go to staging.
    is_updating: bool,
    /// Bumped by every [`drain_all`](PhaseQueue::drain_all). A scan compares
    /// it across a visit to detect that the queue was reset underneath the
    /// in-transit routine.
    epoch: u64,
}

impl PhaseQueue {
    pub(crate) fn new(phase: Phase) -> Self {
        Self {
            phase,
            slots: [SlotVec::new(), SlotVec::new(), SlotVec::new()],
            staging: (0..Phase::COUNT).map(|_| Default::default()).collect(),
            is_updating: false,
            epoch: 0,
        }
    }

    /// Live routines in this queue, staged arrivals included.
    pub(crate) fn count(&self) -> usize {
        let slotted: usize = self.slots.iter().map(SlotVec::live).sum();
        let staged: usize = self
            .staging
            .iter()
            .flat_map(|buckets| buckets.iter())
            .map(SmallVec::len)
            .sum();
        slotted + staged
    }

    /// Adds a routine suspended on this queue's phase. Mid-scan insertions are
    /// staged so the running iteration never sees them.
    pub(crate) fn insert(&mut self, routine: RoutineBox) {
        debug_assert_eq!(routine.phase(), self.phase, "routine inserted into wrong phase queue");
        if self.is_updating {
            self.stage(routine);
        } else {
            let kind = SlotKind::for_routine(&routine);
            self.slots[kind.index()].insert(routine);
        }
    }

    /// Parks a routine in the staging bucket its instruction names. The
    /// destination may be any phase, this one included.
    pub(crate) fn stage(&mut self, routine: RoutineBox) {
        let phase = routine.phase().index();
        let kind = SlotKind::for_routine(&routine);
        self.staging[phase][kind.index()].push(routine);
    }

    /// Drains every staged routine in phase order, FIFO within each bucket.
    pub(crate) fn take_staged(&mut self) -> Vec<RoutineBox> {
        let mut drained = Vec::new();
        for buckets in &mut self.staging {
            for bucket in buckets {
                drained.extend(bucket.drain(..));
            }
        }
        drained
    }

    /// Empties the queue entirely, returning every resident and staged
    /// routine. Used for bulk resets. A routine currently in transit is not
    /// returned; the scan that owns it notices the drain and cancels it when
    /// the visit comes back.
    pub(crate) fn drain_all(&mut self) -> Vec<RoutineBox> {
        self.epoch = self.epoch.wrapping_add(1);
        let mut drained = Vec::new();
        for slot in &mut self.slots {
            drained.append(&mut slot.take_all());
        }
        drained.append(&mut self.take_staged());
        drained
    }
}

/// Runs a full tick scan over `queue`.
pub(crate) fn step(queue: &Rc<RefCell<PhaseQueue>>) {
    run_scan(queue, ScanMode::Full);
}

/// Runs an expiry-only scan over `queue`.
pub(crate) fn purge(queue: &Rc<RefCell<PhaseQueue>>) {
    run_scan(queue, ScanMode::ExpireOnly);
}

fn run_scan(queue: &Rc<RefCell<PhaseQueue>>, mode: ScanMode) {
    let phase = {
        let mut q = queue.borrow_mut();
        if q.is_updating {
            // Reachable from user code: a stepping routine called back into
            // the scheduler for the phase being scanned. That scan's own
            // visits already cover this queue, so the nested one is a no-op.
            warn!(phase = %q.phase, "nested scan of an already-scanning queue skipped");
            return;
        }
        q.is_updating = true;
        q.phase
    };

    // A panic escaping the scan itself (not a routine visit, those are
    // contained below) abandons this tick's scan; the flag must be cleared on
    // that path too or the queue would stage forever.
    let result = catch_unwind(AssertUnwindSafe(|| scan(queue, mode)));
    queue.borrow_mut().is_updating = false;
    if let Err(payload) = result {
        error!(%phase, panic = %panic_message(&*payload), "phase scan aborted");
    }
}

fn scan(queue: &Rc<RefCell<PhaseQueue>>, mode: ScanMode) {
    let (now_sim, now_real) = {
        let clock = time::current();
        (clock.time(), clock.real_time())
    };

    for kind in SlotKind::ALL {
        let slot_count = queue.borrow().slots[kind.index()].slot_count();
        for index in 0..slot_count {
            let (taken, epoch) = {
                let mut q = queue.borrow_mut();
                let taken = q.slots[kind.index()].begin_transit(index);
                (taken, q.epoch)
            };
            let Some(routine) = taken else { continue };

            // Held across the visit so a panicking oracle or predicate still
            // fails the right promise after the routine itself is gone.
            let promise = routine.promise().clone();
            let name = routine.name();

            let visit = catch_unwind(AssertUnwindSafe(|| {
                visit_routine(routine, kind, mode, now_sim, now_real)
            }));
            match visit {
                Ok(Visit::Keep(routine)) => {
                    let mut q = queue.borrow_mut();
                    if q.epoch == epoch {
                        q.slots[kind.index()].finish_keep(index, routine);
                    } else {
                        // The queue was drained during the visit; the
                        // in-transit routine must not outlive the reset.
                        q.slots[kind.index()].finish_remove(index);
                        drop(q);
                        routine.cancel();
                    }
                }
                Ok(Visit::Remove) => {
                    queue.borrow_mut().slots[kind.index()].finish_remove(index);
                }
                Ok(Visit::Restage(routine)) => {
                    let mut q = queue.borrow_mut();
                    q.slots[kind.index()].finish_remove(index);
                    if q.epoch == epoch {
                        q.stage(routine);
                    } else {
                        drop(q);
                        routine.cancel();
                    }
                }
                Err(payload) => {
                    queue.borrow_mut().slots[kind.index()].finish_remove(index);
                    let message = panic_message(&*payload);
                    error!(routine = name, panic = %message, "routine visit panicked");
                    if promise.is_pending() {
                        promise.fail(RoutineError::panicked(message));
                    }
                }
            }
        }
    }

    if matches!(mode, ScanMode::ExpireOnly) {
        sweep_staged(queue);
    }
}

fn visit_routine(
    mut routine: RoutineBox,
    kind: SlotKind,
    mode: ScanMode,
    now_sim: f64,
    now_real: f64,
) -> Visit {
    if routine.promise().is_canceled() {
        trace!(routine = routine.name(), "dropping canceled routine");
        return Visit::Remove;
    }

    if matches!(mode, ScanMode::ExpireOnly) {
        if routine.should_auto_cancel() {
            trace!(routine = routine.name(), "purging routine with dead liveness");
            routine.cancel();
            return Visit::Remove;
        }
        return Visit::Keep(routine);
    }

    if routine.is_paused() {
        return Visit::Keep(routine);
    }

    // Defer gates come before the liveness check: deferred routines pay
    // nothing per tick until their timestamp elapses, and a dead one is
    // reaped on the first visit after that.
    match kind {
        SlotKind::DeferredSim if routine.defer_until_sim() > now_sim => {
            return Visit::Keep(routine)
        }
        SlotKind::DeferredReal if routine.defer_until_real() > now_real => {
            return Visit::Keep(routine)
        }
        _ => {}
    }

    if routine.should_auto_cancel() {
        trace!(routine = routine.name(), "auto-canceling routine with dead liveness");
        routine.cancel();
        return Visit::Remove;
    }

    if !routine.poll_current() {
        return Visit::Keep(routine);
    }

    let before = placement(&routine);
    match routine.step() {
        StepOutcome::Finished => Visit::Remove,
        StepOutcome::Suspended => {
            if placement(&routine) == before && SlotKind::for_routine(&routine) == kind {
                // Same phase, same defer timestamps: the routine keeps its
                // slot and its scan position.
                Visit::Keep(routine)
            } else {
                Visit::Restage(routine)
            }
        }
    }
}

fn placement(routine: &RoutineBox) -> (Phase, f64, f64) {
    (
        routine.phase(),
        routine.defer_until_sim(),
        routine.defer_until_real(),
    )
}

/// Expiry pass over the staging buffers. Survivors are re-staged (the scan's
/// `is_updating` flag routes the insert straight back to staging).
fn sweep_staged(queue: &Rc<RefCell<PhaseQueue>>) {
    let staged = queue.borrow_mut().take_staged();
    for routine in staged {
        if routine.promise().is_canceled() {
            continue;
        }
        if routine.should_auto_cancel() {
            routine.cancel();
            continue;
        }
        queue.borrow_mut().stage(routine);
    }
}
