//! Internal support structures.

mod panic;
mod rng;
mod slots;

pub(crate) use panic::panic_message;
pub(crate) use rng::jitter_unit;
pub(crate) use slots::SlotVec;
