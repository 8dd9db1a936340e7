//! Growable circular buffer backing every task queue
//!
//! Amortized O(1) insertion and O(1) removal. After a slight initial cost the
//! buffer stops allocating, which suits queues that are rapidly filled and
//! drained by a small number of elements.

use crate::defaults::MIN_QUEUE_CAPACITY;
use crate::{ThrError, ThrResult};
use std::fmt;

/// FIFO ring buffer that grows when full and never shrinks
pub struct RingQueue<T> {
    /// Backing slots; live elements are `Some`
    slots: Vec<Option<T>>,

    /// Next index to extract
    read: usize,

    /// Next index to insert to
    write: usize,
}

impl<T> RingQueue<T> {
    /// Create an empty queue with the minimum usable capacity
    pub fn new() -> Self {
        Self::with_capacity(MIN_QUEUE_CAPACITY)
    }

    /// Create an empty queue with the given capacity
    ///
    /// # Panics
    /// Panics if `capacity < 2`: with one slot an empty queue can't be told
    /// apart from a full one.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= MIN_QUEUE_CAPACITY,
            "ring queue capacity must be at least {}",
            MIN_QUEUE_CAPACITY
        );
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            read: 0,
            write: 0,
        }
    }

    /// Current capacity of the backing array
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            self.write + (self.capacity() - self.read)
        }
    }

    /// Check if the queue holds no elements
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    fn next_index(&self, index: usize) -> usize {
        let next = index + 1;
        if next >= self.capacity() {
            0
        } else {
            next
        }
    }

    /// Append an element, growing the buffer if it would become full
    pub fn put(&mut self, value: T) {
        let mut next_write = self.next_index(self.write);

        if next_write == self.read {
            next_write = self.grow();
        }

        self.slots[self.write] = Some(value);
        self.write = next_write;
    }

    /// Remove and return the oldest element
    pub fn get(&mut self) -> ThrResult<T> {
        if self.is_empty() {
            return Err(ThrError::EmptyQueue {
                capacity: self.capacity(),
            });
        }

        let index = self.read;
        self.read = self.next_index(index);
        self.slots[index]
            .take()
            .ok_or(ThrError::EmptyQueue {
                capacity: self.capacity(),
            })
    }

    /// Drop every element and reset the cursors
    pub fn clear(&mut self) {
        while self.get().is_ok() {}
        self.read = 0;
        self.write = 0;
    }

    /// Grow by half (at least one slot), compacting live elements to index 0.
    ///
    /// Only called when the next insertion would make the buffer full.
    /// Returns the slot after the pending insertion.
    fn grow(&mut self) -> usize {
        let old = self.capacity();
        let new_capacity = old + (old >> 1).max(1);
        let live = self.len();
        debug_assert_eq!(live, old - 1);

        let mut slots: Vec<Option<T>> = Vec::with_capacity(new_capacity);
        let mut index = self.read;
        for _ in 0..live {
            slots.push(self.slots[index].take());
            index = self.next_index(index);
        }
        slots.resize_with(new_capacity, || None);

        self.slots = slots;
        self.read = 0;
        self.write = live;

        live + 1
    }
}

impl<T> Default for RingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}
