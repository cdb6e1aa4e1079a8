//! Pluggable time for yield instructions.
//!
//! Yield constructors resolve defer timestamps against the *current* time
//! source, taken from a thread-local stack. The stack lets an alternate
//! execution context (a replay harness, an editor preview, a test) override
//! time for a while without the scheduler knowing, then restore whatever was
//! underneath.
//!
//! The stack is initialized on first use with a [`WallClockTimeSource`], so a
//! host that never installs a clock still gets monotonic real time. Hosts
//! that drive a tick loop should push their own source (usually a
//! [`ManualTimeSource`]) at startup.
//!
//! Sources are deliberately thread-local, matching the scheduler's
//! single-threaded model.

mod source;

pub use source::{ManualTimeSource, TimeSource, WallClockTimeSource};

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static STACK: RefCell<Vec<Rc<dyn TimeSource>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the active time source (the top of the stack), installing the
/// wall-clock default first if the stack is empty.
#[must_use]
pub fn current() -> Rc<dyn TimeSource> {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.is_empty() {
            stack.push(Rc::new(WallClockTimeSource::new()));
        }
        Rc::clone(stack.last().expect("time source stack is non-empty"))
    })
}

/// Pushes `source` as the active time source.
///
/// Prefer [`source_scope`] where the override has a clear lexical extent.
pub fn push_source(source: Rc<dyn TimeSource>) {
    STACK.with(|stack| stack.borrow_mut().push(source));
}

/// Removes a previously pushed source, wherever it sits in the stack,
/// matching by identity. Returns whether anything was removed.
pub fn remove_source(source: &Rc<dyn TimeSource>) -> bool {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.iter().position(|s| Rc::ptr_eq(s, source)) {
            Some(index) => {
                stack.remove(index);
                true
            }
            None => false,
        }
    })
}

/// Pushes `source` and returns a guard that removes it again on drop.
pub fn source_scope<S: TimeSource + 'static>(source: Rc<S>) -> SourceScope {
    let source: Rc<dyn TimeSource> = source;
    push_source(Rc::clone(&source));
    SourceScope { source }
}

/// Guard holding a time-source override; removes the source when dropped.
#[must_use = "dropping the scope immediately removes the time source again"]
pub struct SourceScope {
    source: Rc<dyn TimeSource>,
}

impl Drop for SourceScope {
    fn drop(&mut self) {
        remove_source(&self.source);
    }
}
