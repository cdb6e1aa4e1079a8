//! Dense slot storage with tombstoned removal.
//!
//! Backing collection for the per-phase routine slots. Elements live in a
//! `Vec<Option<T>>`; removed entries leave a vacant slot tracked on a free
//! stack, and new insertions reuse vacant slots before growing. Scanning is
//! O(slots ever occupied at once) and removal mid-scan is O(1) without
//! shifting live elements.
//!
//! Unlike a general-purpose arena there are no generation counters: indices
//! never escape the owning queue, so ABA safety is not a concern here.

use smallvec::SmallVec;

/// A dense collection with free-list slot reuse and stable iteration order.
///
/// Supports a two-step transit protocol for mid-scan mutation: a scan takes
/// an element out with [`begin_transit`](SlotVec::begin_transit), runs
/// arbitrary code while the slot stays reserved, then either restores it with
/// [`finish_keep`](SlotVec::finish_keep) or releases it with
/// [`finish_remove`](SlotVec::finish_remove). An in-transit slot is vacant
/// but not on the free stack, so it cannot be reused underneath the scan, and
/// it still counts as live.
#[derive(Debug)]
pub(crate) struct SlotVec<T> {
    slots: Vec<Option<T>>,
    free: SmallVec<[usize; 8]>,
    in_transit: SmallVec<[usize; 2]>,
    live: usize,
}

impl<T> Default for SlotVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotVec<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: SmallVec::new(),
            in_transit: SmallVec::new(),
            live: 0,
        }
    }

    /// Number of live elements, including any element currently in transit.
    pub(crate) const fn live(&self) -> usize {
        self.live
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total number of slots, vacant ones included. Scans iterate `0..slot_count()`.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Inserts a value, reusing a vacant slot before growing.
    pub(crate) fn insert(&mut self, value: T) -> usize {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            debug_assert!(self.slots[index].is_none(), "free stack pointed to occupied slot");
            self.slots[index] = Some(value);
            index
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    /// Takes the element at `index` out for a transit, leaving the slot
    /// reserved. Returns `None` for vacant slots.
    pub(crate) fn begin_transit(&mut self, index: usize) -> Option<T> {
        let taken = self.slots.get_mut(index).and_then(Option::take);
        if taken.is_some() {
            self.in_transit.push(index);
        }
        taken
    }

    /// Restores an element taken by [`begin_transit`](SlotVec::begin_transit)
    /// to its original slot.
    pub(crate) fn finish_keep(&mut self, index: usize, value: T) {
        debug_assert!(self.slots[index].is_none(), "finish_keep on occupied slot");
        self.clear_transit(index);
        self.slots[index] = Some(value);
    }

    /// Releases the slot of an element taken by
    /// [`begin_transit`](SlotVec::begin_transit), making it reusable.
    pub(crate) fn finish_remove(&mut self, index: usize) {
        debug_assert!(self.slots[index].is_none(), "finish_remove on occupied slot");
        self.clear_transit(index);
        self.free.push(index);
        self.live -= 1;
    }

    fn clear_transit(&mut self, index: usize) {
        if let Some(pos) = self.in_transit.iter().position(|&i| i == index) {
            self.in_transit.swap_remove(pos);
        }
    }

    /// Drains every live element except any currently in transit. The slot
    /// vector keeps its length and in-transit slots stay reserved, so a
    /// drain that happens underneath a running scan (user code calling back
    /// into the owner) leaves the scan's `finish_*` calls valid.
    pub(crate) fn take_all(&mut self) -> Vec<T> {
        self.free.clear();
        let mut drained = Vec::with_capacity(self.live);
        for index in 0..self.slots.len() {
            if let Some(value) = self.slots[index].take() {
                drained.push(value);
            }
            if !self.in_transit.contains(&index) {
                self.free.push(index);
            }
        }
        self.live = self.in_transit.len();
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reuses_freed_slots_before_growing() {
        let mut slots = SlotVec::new();
        let a = slots.insert("a");
        let b = slots.insert("b");
        assert_eq!((a, b), (0, 1));

        let taken = slots.begin_transit(a);
        assert_eq!(taken, Some("a"));
        slots.finish_remove(a);
        assert_eq!(slots.live(), 1);

        let c = slots.insert("c");
        assert_eq!(c, a, "vacant slot should be reused");
        assert_eq!(slots.slot_count(), 2);
        assert_eq!(slots.live(), 2);
    }

    #[test]
    fn in_transit_slot_is_not_reused() {
        let mut slots = SlotVec::new();
        let a = slots.insert(1);
        let _taken = slots.begin_transit(a).unwrap();

        // The slot is reserved while in transit: live count holds and a new
        // insertion must not land on it.
        assert_eq!(slots.live(), 1);
        let b = slots.insert(2);
        assert_ne!(a, b);

        slots.finish_keep(a, 1);
        assert_eq!(slots.live(), 2);
    }

    #[test]
    fn begin_transit_on_vacant_slot_returns_none() {
        let mut slots = SlotVec::new();
        let a = slots.insert(7);
        slots.begin_transit(a).unwrap();
        slots.finish_remove(a);
        assert_eq!(slots.begin_transit(a), None);
    }

    #[test]
    fn iteration_order_is_slot_order() {
        let mut slots = SlotVec::new();
        slots.insert(10);
        let b = slots.insert(20);
        slots.insert(30);
        slots.begin_transit(b).unwrap();
        slots.finish_remove(b);
        slots.insert(40); // reuses b's slot

        let mut seen = Vec::new();
        for i in 0..slots.slot_count() {
            if let Some(v) = slots.begin_transit(i) {
                seen.push(v);
                slots.finish_keep(i, v);
            }
        }
        assert_eq!(seen, vec![10, 40, 30]);
    }

    #[test]
    fn take_all_drains_and_resets() {
        let mut slots = SlotVec::new();
        slots.insert(1);
        let b = slots.insert(2);
        slots.insert(3);
        slots.begin_transit(b).unwrap();
        slots.finish_remove(b);

        let drained = slots.take_all();
        assert_eq!(drained, vec![1, 3]);
        assert!(slots.is_empty());

        // Vacated slots are all reusable.
        let a = slots.insert(9);
        assert!(a < 3);
        assert_eq!(slots.live(), 1);
    }

    #[test]
    fn take_all_leaves_an_in_transit_slot_reserved() {
        let mut slots = SlotVec::new();
        let a = slots.insert(1);
        slots.insert(2);
        slots.insert(3);

        let taken = slots.begin_transit(a).unwrap();
        let drained = slots.take_all();
        assert_eq!(drained, vec![2, 3]);
        assert_eq!(slots.live(), 1, "the in-transit element still counts");

        // The reserved slot is not handed out to new insertions.
        let b = slots.insert(4);
        assert_ne!(a, b);

        let _ = taken;
        slots.finish_remove(a);
        assert_eq!(slots.live(), 1);
    }
}
