//! RingQueue FIFO behavior against a reference queue

use naju_thr::{RingQueue, ThrError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

#[test]
fn test_fifo_matches_vecdeque() {
    for seed in 0..32u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut queue = RingQueue::new();
        let mut reference = VecDeque::new();
        let mut next = 0u32;

        for _ in 0..2_000 {
            // Bias towards puts so the buffer grows through several sizes
            if rng.gen_bool(0.6) {
                queue.put(next);
                reference.push_back(next);
                next += 1;
            } else {
                match reference.pop_front() {
                    Some(expected) => assert_eq!(queue.get(), Ok(expected)),
                    None => assert!(matches!(queue.get(), Err(ThrError::EmptyQueue { .. }))),
                }
            }
            assert_eq!(queue.len(), reference.len());
            assert!(queue.len() < queue.capacity());
        }

        while let Some(expected) = reference.pop_front() {
            assert_eq!(queue.get(), Ok(expected));
        }
        assert!(queue.is_empty());
    }
}

#[test]
fn test_growth_keeps_live_elements_in_order() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut queue = RingQueue::with_capacity(4);
    let mut reference = VecDeque::new();

    // Rotate the cursors so growth happens while wrapped
    for _ in 0..3 {
        queue.put(0u64);
        queue.get().unwrap();
    }

    let mut capacity = queue.capacity();
    for _ in 0..200 {
        let value: u64 = rng.gen();
        queue.put(value);
        reference.push_back(value);

        if queue.capacity() != capacity {
            assert_eq!(queue.capacity(), capacity + (capacity >> 1).max(1));
            assert_eq!(queue.len(), capacity);
            capacity = queue.capacity();
        }
    }

    let drained: Vec<u64> = std::iter::from_fn(|| queue.get().ok()).collect();
    assert_eq!(drained, Vec::from(reference));
}

#[test]
fn test_empty_get_reports_capacity() {
    let mut queue: RingQueue<()> = RingQueue::with_capacity(5);
    assert_eq!(queue.get(), Err(ThrError::EmptyQueue { capacity: 5 }));
}
