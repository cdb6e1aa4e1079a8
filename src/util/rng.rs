//! Small deterministic pseudo-random number generator.
//!
//! Used to jitter the start offset of fixed-rate yields so that many
//! routines started on the same tick do not all resume on the same tick
//! forever. xorshift64: fast, dependency-free, not cryptographically secure.

use std::cell::Cell;

/// A deterministic xorshift64 PRNG.
#[derive(Debug, Clone)]
pub(crate) struct DetRng {
    state: u64,
}

impl DetRng {
    /// Creates a PRNG from a seed. A zero seed is replaced with 1, since
    /// xorshift has an all-zero fixed point.
    pub(crate) const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in `[0, 1)`.
    pub(crate) fn next_f64(&mut self) -> f64 {
        // 53 mantissa bits of the raw output.
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

thread_local! {
    static JITTER: Cell<u64> = const { Cell::new(0) };
}

/// Returns a jitter value in `[0, 1)` from a per-thread generator.
pub(crate) fn jitter_unit() -> f64 {
    JITTER.with(|state| {
        let seed = if state.get() == 0 {
            // First use on this thread: fold in a wall-clock component so
            // separate runs do not share a schedule.
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0x9e37_79b9_7f4a_7c15, |d| d.as_nanos() as u64)
        } else {
            state.get()
        };
        let mut rng = DetRng::new(seed);
        let value = rng.next_f64();
        state.set(rng.state);
        value
    })
}
