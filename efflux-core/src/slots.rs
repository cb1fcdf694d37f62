// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Per-subscriber slot registry.
//!
//! A grow-only array of slots living inside the shared stream's single lock.
//! Allocation reuses the lowest free slot (amortized O(1) via a scan hint);
//! the backing storage doubles as it grows.

use std::task::Waker;

pub(crate) type SlotId = usize;

/// State of one subscriber: the logical index of the next value to deliver
/// and, while the subscriber is parked, its wakeup handle. A free slot has
/// no cursor.
pub(crate) struct Slot {
    pub(crate) cursor: Option<u64>,
    pub(crate) waker: Option<Waker>,
}

pub(crate) struct SlotRegistry {
    slots: Vec<Slot>,
    active: usize,
    next_free: usize,
}

impl SlotRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            active: 0,
            next_free: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of currently allocated slots.
    pub(crate) fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id]
    }

    pub(crate) fn slot_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id]
    }

    /// Allocate a slot positioned at `cursor`, reusing a free one if any.
    pub(crate) fn allocate(&mut self, cursor: u64) -> SlotId {
        let start = self.next_free.min(self.slots.len());
        let reusable = (start..self.slots.len())
            .chain(0..start)
            .find(|&id| self.slots[id].cursor.is_none());
        let id = match reusable {
            Some(id) => id,
            None => {
                self.slots.push(Slot {
                    cursor: None,
                    waker: None,
                });
                self.slots.len() - 1
            }
        };
        self.slots[id].cursor = Some(cursor);
        self.slots[id].waker = None;
        self.active += 1;
        self.next_free = id + 1;
        id
    }

    /// Free a slot, returning its cursor so the caller can recompute the
    /// minimum collector index (and resume producers blocked on it).
    pub(crate) fn free(&mut self, id: SlotId) -> Option<u64> {
        let slot = self.slots.get_mut(id)?;
        let cursor = slot.cursor.take()?;
        slot.waker = None;
        self.active -= 1;
        self.next_free = self.next_free.min(id);
        Some(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_reuses_freed_slots() {
        let mut registry = SlotRegistry::new();
        let a = registry.allocate(0);
        let b = registry.allocate(0);
        assert_ne!(a, b);
        assert_eq!(registry.active(), 2);

        assert_eq!(registry.free(a), Some(0));
        assert_eq!(registry.active(), 1);

        let c = registry.allocate(7);
        assert_eq!(c, a);
        assert_eq!(registry.slot(c).cursor, Some(7));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn free_is_idempotent() {
        let mut registry = SlotRegistry::new();
        let id = registry.allocate(3);
        assert_eq!(registry.free(id), Some(3));
        assert_eq!(registry.free(id), None);
        assert_eq!(registry.active(), 0);
    }
}
