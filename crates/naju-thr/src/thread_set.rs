//! Bounded list of worker threads
//!
//! Each set keeps its members in a fixed-capacity array and every member
//! remembers its own slot, so insertion, removal and membership checks are
//! all O(1). Removal swaps the last member into the vacated slot.

use crate::worker::{WorkerId, WorkerTable};
use std::fmt;

/// Which scheduler pool a set represents
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Awake workers
    Active,
    /// Suspended workers available for work
    Sleeping,
    /// Workers parked at a collection point
    Waiting,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Active => write!(f, "active"),
            PoolKind::Sleeping => write!(f, "sleeping"),
            PoolKind::Waiting => write!(f, "waiting"),
        }
    }
}

/// Back-reference from a handle to the set holding it
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Owning set
    pub pool: PoolKind,
    /// Slot in the owning set
    pub slot: usize,
}

/// Fixed-capacity set of worker handles
#[derive(Debug)]
pub struct ThreadSet {
    /// Pool this set represents
    kind: PoolKind,

    /// Members, densely packed in `0..len`
    slots: Vec<WorkerId>,

    /// Maximum number of members
    capacity: usize,
}

impl ThreadSet {
    /// Create an empty set
    pub fn new(kind: PoolKind, capacity: usize) -> Self {
        Self {
            kind,
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Pool this set represents
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Maximum number of members
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of members
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the set has no members
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Most recently appended member
    pub fn last(&self) -> Option<WorkerId> {
        self.slots.last().copied()
    }

    /// Member ids in slot order
    pub fn members(&self) -> &[WorkerId] {
        &self.slots
    }

    /// Check if a handle is a member of this set
    pub fn contains<T: WorkerTable>(&self, table: &T, id: WorkerId) -> bool {
        table
            .worker(id)
            .membership()
            .is_some_and(|m| m.pool == self.kind)
    }

    fn assert_room<T: WorkerTable>(&self, table: &T, id: WorkerId) {
        assert!(
            self.slots.len() < self.capacity,
            "{} thread set full (capacity {})",
            self.kind,
            self.capacity
        );
        assert!(
            table.worker(id).membership().is_none(),
            "worker {} is already in the {} set",
            id,
            table.worker(id).membership().map(|m| m.pool).unwrap_or(self.kind)
        );
    }

    /// Insert a handle into the first slot.
    ///
    /// The previous first member moves to the end.
    ///
    /// # Panics
    /// Panics if the set is full or the handle belongs to another set.
    pub fn add_first<T: WorkerTable>(&mut self, table: &mut T, id: WorkerId) {
        self.assert_room(&*table, id);

        if let Some(&first) = self.slots.first() {
            table.worker_mut(first).set_slot(self.slots.len());
            self.slots.push(first);
            self.slots[0] = id;
        } else {
            self.slots.push(id);
        }

        table.worker_mut(id).set_membership(Some(Membership {
            pool: self.kind,
            slot: 0,
        }));
    }

    /// Insert a handle into the last slot.
    ///
    /// # Panics
    /// Panics if the set is full or the handle belongs to another set.
    pub fn add_last<T: WorkerTable>(&mut self, table: &mut T, id: WorkerId) {
        self.assert_room(&*table, id);

        table.worker_mut(id).set_membership(Some(Membership {
            pool: self.kind,
            slot: self.slots.len(),
        }));
        self.slots.push(id);
    }

    /// Remove a handle, moving the last member into its slot.
    ///
    /// # Panics
    /// Panics if the handle is not a member of this set.
    pub fn remove<T: WorkerTable>(&mut self, table: &mut T, id: WorkerId) {
        let slot = match table.worker(id).membership() {
            Some(m) if m.pool == self.kind => m.slot,
            other => panic!(
                "worker {} is not in the {} set (membership: {:?})",
                id, self.kind, other
            ),
        };
        debug_assert_eq!(self.slots[slot], id);

        self.slots.swap_remove(slot);
        if let Some(&moved) = self.slots.get(slot) {
            table.worker_mut(moved).set_slot(slot);
        }
        table.worker_mut(id).set_membership(None);
    }

    /// Wake every member and move them all into `dest`, emptying this set
    pub fn notify_all<T: WorkerTable>(&mut self, dest: &mut ThreadSet, table: &mut T) {
        for id in self.slots.drain(..) {
            table.worker_mut(id).set_membership(None);
            table.worker_mut(id).notify();
            dest.add_last(table, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{WakeState, WorkerHandle};

    fn table(count: usize) -> Vec<WorkerHandle> {
        (0..count).map(|i| WorkerHandle::new(WorkerId::new(i))).collect()
    }

    fn id(index: usize) -> WorkerId {
        WorkerId::new(index)
    }

    /// Every member's recorded slot must match its real position
    fn assert_consistent(set: &ThreadSet, table: &Vec<WorkerHandle>) {
        for (slot, &member) in set.members().iter().enumerate() {
            assert_eq!(
                table.worker(member).membership(),
                Some(Membership {
                    pool: set.kind(),
                    slot
                })
            );
        }
    }

    #[test]
    fn test_add_last_and_last() {
        let mut workers = table(3);
        let mut set = ThreadSet::new(PoolKind::Active, 3);
        assert!(set.last().is_none());

        set.add_last(&mut workers, id(0));
        set.add_last(&mut workers, id(1));
        assert_eq!(set.len(), 2);
        assert_eq!(set.last(), Some(id(1)));
        assert!(set.contains(&workers, id(0)));
        assert!(!set.contains(&workers, id(2)));
        assert_consistent(&set, &workers);
    }

    #[test]
    fn test_add_first_moves_previous_first_to_end() {
        let mut workers = table(3);
        let mut set = ThreadSet::new(PoolKind::Sleeping, 3);

        set.add_last(&mut workers, id(0));
        set.add_last(&mut workers, id(1));
        set.add_first(&mut workers, id(2));

        assert_eq!(set.members(), &[id(2), id(1), id(0)]);
        assert_eq!(set.last(), Some(id(0)));
        assert_consistent(&set, &workers);
    }

    #[test]
    fn test_add_first_into_empty() {
        let mut workers = table(1);
        let mut set = ThreadSet::new(PoolKind::Sleeping, 1);
        set.add_first(&mut workers, id(0));
        assert_eq!(set.members(), &[id(0)]);
        assert_consistent(&set, &workers);
    }

    #[test]
    fn test_remove_swaps_last_into_slot() {
        let mut workers = table(4);
        let mut set = ThreadSet::new(PoolKind::Active, 4);
        for i in 0..4 {
            set.add_last(&mut workers, id(i));
        }

        set.remove(&mut workers, id(1));
        assert_eq!(set.members(), &[id(0), id(3), id(2)]);
        assert!(workers.worker(id(1)).membership().is_none());
        assert_consistent(&set, &workers);

        // Removing the last member needs no swap
        set.remove(&mut workers, id(2));
        assert_eq!(set.members(), &[id(0), id(3)]);
        assert_consistent(&set, &workers);

        set.remove(&mut workers, id(0));
        set.remove(&mut workers, id(3));
        assert!(set.is_empty());
    }

    #[test]
    #[should_panic(expected = "thread set full")]
    fn test_overflow_panics() {
        let mut workers = table(2);
        let mut set = ThreadSet::new(PoolKind::Active, 1);
        set.add_last(&mut workers, id(0));
        set.add_last(&mut workers, id(1));
    }

    #[test]
    #[should_panic(expected = "already in the active set")]
    fn test_member_of_two_sets_panics() {
        let mut workers = table(1);
        let mut active = ThreadSet::new(PoolKind::Active, 1);
        let mut sleeping = ThreadSet::new(PoolKind::Sleeping, 1);
        active.add_last(&mut workers, id(0));
        sleeping.add_last(&mut workers, id(0));
    }

    #[test]
    #[should_panic(expected = "is not in the sleeping set")]
    fn test_remove_from_wrong_set_panics() {
        let mut workers = table(1);
        let mut active = ThreadSet::new(PoolKind::Active, 1);
        let mut sleeping = ThreadSet::new(PoolKind::Sleeping, 1);
        active.add_last(&mut workers, id(0));
        sleeping.remove(&mut workers, id(0));
    }

    #[test]
    fn test_notify_all_moves_everyone() {
        let mut workers = table(3);
        let mut waiting = ThreadSet::new(PoolKind::Waiting, 3);
        let mut active = ThreadSet::new(PoolKind::Active, 3);

        active.add_last(&mut workers, id(0));
        waiting.add_last(&mut workers, id(1));
        waiting.add_last(&mut workers, id(2));
        workers[1].notify_with(true);

        waiting.notify_all(&mut active, &mut workers);

        assert!(waiting.is_empty());
        assert_eq!(active.members(), &[id(0), id(1), id(2)]);
        assert_eq!(workers.worker(id(1)).state(), WakeState::Active);
        assert_eq!(workers.worker(id(2)).state(), WakeState::Active);
        assert_consistent(&active, &workers);
    }

    #[test]
    fn test_notify_all_keeps_storage() {
        let mut workers = table(2);
        let mut sleeping = ThreadSet::new(PoolKind::Sleeping, 2);
        let mut active = ThreadSet::new(PoolKind::Active, 2);
        let storage = sleeping.slots.as_ptr();

        sleeping.add_last(&mut workers, id(0));
        sleeping.add_last(&mut workers, id(1));
        sleeping.notify_all(&mut active, &mut workers);

        assert!(sleeping.is_empty());
        assert!(sleeping.slots.capacity() >= 2);
        assert_eq!(sleeping.slots.as_ptr(), storage);

        // Refilling stays within the original buffer
        active.remove(&mut workers, id(1));
        sleeping.add_first(&mut workers, id(1));
        assert_eq!(sleeping.slots.as_ptr(), storage);
        assert_consistent(&sleeping, &workers);
    }
}
