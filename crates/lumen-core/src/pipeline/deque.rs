//! Bounded lock-free work-stealing deque.
//!
//! The owning worker pushes and pops at the bottom; any worker may steal from
//! the top. Slots hold [`TaskHandle`]s rather than tasks: the task itself sits
//! in the [`TaskArena`](super::TaskArena) and whoever wins a handle from this
//! deque is its only claimant.
//!
//! # Indices
//!
//! `top` and `bottom` are 64-bit logical counters that only move forward
//! (`bottom` dips by one inside `pop_bottom` and is restored if the pop
//! fails). A counter maps to slot `counter & mask`; its bits above the mask are
//! the lap stamp, so each stored `top` value is a `(position, stamp)` pair that
//! is never reused. A thief holding a stale `top` therefore always loses its
//! CAS, even after the same physical slot has been refilled.
//!
//! `top` is only changed by CAS. `bottom` is only written by the owner.

use std::sync::atomic::{fence, AtomicI64, AtomicU64, Ordering};

use crate::error::DequeError;

/// Opaque handle of a task parked in the arena.
///
/// Only [`TaskArena::insert`](super::TaskArena::insert) hands out handles
/// that refer to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) u64);

impl TaskHandle {
    /// Raw handle for exercising a bare deque, e.g. in benchmarks.
    #[doc(hidden)]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

/// A `top` value split into slot position and lap stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampedIndex {
    /// Physical slot
    pub position: usize,
    /// Number of completed laps around the slot array
    pub stamp: u64,
}

/// Fixed-capacity work-stealing deque of task handles.
pub struct ConcurrentDeque {
    top: AtomicI64,
    bottom: AtomicI64,
    slots: Box<[AtomicU64]>,
    mask: usize,
    lap_shift: u32,
}

impl ConcurrentDeque {
    /// Default slot count.
    pub const DEFAULT_CAPACITY: usize = 1 << 16;

    /// Create a deque with `capacity` slots, rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            top: AtomicI64::new(0),
            bottom: AtomicI64::new(0),
            slots,
            mask: capacity - 1,
            lap_shift: capacity.trailing_zeros(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Owner only. Append at the bottom.
    ///
    /// Fails without side effects when every slot is occupied.
    pub fn push_bottom(&self, handle: TaskHandle) -> Result<(), DequeError> {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        if b - t >= self.capacity() as i64 {
            return Err(DequeError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        self.slot(b).store(handle.0, Ordering::Relaxed);
        self.bottom.store(b + 1, Ordering::Release);
        Ok(())
    }

    /// Owner only. Take the most recently pushed handle.
    ///
    /// When one handle is left, this races thieves through a CAS on `top`;
    /// exactly one side gets it.
    pub fn pop_bottom(&self) -> Option<TaskHandle> {
        let b = self.bottom.load(Ordering::Relaxed) - 1;
        self.bottom.store(b, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let t = self.top.load(Ordering::Relaxed);

        if t > b {
            // already empty
            self.bottom.store(b + 1, Ordering::Relaxed);
            return None;
        }

        let handle = TaskHandle(self.slot(b).load(Ordering::Relaxed));
        if t < b {
            return Some(handle);
        }

        // last element: settle it with thieves
        let won = self
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok();
        self.bottom.store(b + 1, Ordering::Relaxed);
        won.then_some(handle)
    }

    /// Any worker. Take the oldest handle.
    ///
    /// Returns `None` when the deque looks empty or the CAS on `top` loses a
    /// race; callers decide whether to retry.
    pub fn pop_top(&self) -> Option<TaskHandle> {
        let t = self.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = self.bottom.load(Ordering::Acquire);
        if t >= b {
            return None;
        }

        let handle = TaskHandle(self.slot(t).load(Ordering::Relaxed));
        self.top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
            .ok()
            .map(|_| handle)
    }

    /// Advisory occupancy snapshot, never negative.
    pub fn size(&self) -> usize {
        let b = self.bottom.load(Ordering::Acquire);
        let t = self.top.load(Ordering::Acquire);
        (b - t).max(0) as usize
    }

    /// Advisory emptiness snapshot.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Current `top` split into position and stamp.
    pub fn top_index(&self) -> StampedIndex {
        let t = self.top.load(Ordering::Acquire) as u64;
        StampedIndex {
            position: (t as usize) & self.mask,
            stamp: t >> self.lap_shift,
        }
    }

    #[inline]
    fn slot(&self, counter: i64) -> &AtomicU64 {
        &self.slots[(counter as usize) & self.mask]
    }
}

impl Default for ConcurrentDeque {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for ConcurrentDeque {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentDeque")
            .field("capacity", &self.capacity())
            .field("size", &self.size())
            .field("top", &self.top_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_lifo_at_bottom_fifo_at_top() {
        let deque = ConcurrentDeque::with_capacity(8);
        for i in 1..=3 {
            deque.push_bottom(TaskHandle(i)).unwrap();
        }
        assert_eq!(deque.size(), 3);
        assert_eq!(deque.pop_top(), Some(TaskHandle(1)));
        assert_eq!(deque.pop_bottom(), Some(TaskHandle(3)));
        assert_eq!(deque.pop_bottom(), Some(TaskHandle(2)));
        assert_eq!(deque.pop_bottom(), None);
        assert_eq!(deque.pop_top(), None);
        assert!(deque.is_empty());
    }

    #[test]
    fn test_empty_pops_do_not_corrupt_counters() {
        let deque = ConcurrentDeque::with_capacity(4);
        for _ in 0..10 {
            assert_eq!(deque.pop_bottom(), None);
            assert_eq!(deque.pop_top(), None);
        }
        assert_eq!(deque.size(), 0);
        deque.push_bottom(TaskHandle(42)).unwrap();
        assert_eq!(deque.size(), 1);
        assert_eq!(deque.pop_bottom(), Some(TaskHandle(42)));
    }

    #[test]
    fn test_capacity_rounds_up_to_power_of_two() {
        assert_eq!(ConcurrentDeque::with_capacity(5).capacity(), 8);
        assert_eq!(ConcurrentDeque::with_capacity(0).capacity(), 2);
        assert_eq!(ConcurrentDeque::default().capacity(), 65536);
    }

    #[test]
    fn test_full_deque_rejects_until_a_pop_frees_a_slot() {
        let deque = ConcurrentDeque::with_capacity(4);
        for i in 0..4 {
            deque.push_bottom(TaskHandle(i)).unwrap();
        }
        assert_eq!(
            deque.push_bottom(TaskHandle(99)),
            Err(DequeError::CapacityExceeded { capacity: 4 })
        );
        assert_eq!(deque.size(), 4);

        assert_eq!(deque.pop_top(), Some(TaskHandle(0)));
        deque.push_bottom(TaskHandle(99)).unwrap();
        assert_eq!(
            deque.push_bottom(TaskHandle(100)),
            Err(DequeError::CapacityExceeded { capacity: 4 })
        );
        assert_eq!(deque.pop_bottom(), Some(TaskHandle(99)));
        deque.push_bottom(TaskHandle(100)).unwrap();
    }

    #[test]
    fn test_wraparound_reuses_slots_and_advances_stamp() {
        let deque = ConcurrentDeque::with_capacity(4);
        for i in 0..10u64 {
            deque.push_bottom(TaskHandle(i)).unwrap();
            assert_eq!(deque.pop_top(), Some(TaskHandle(i)));
        }
        let top = deque.top_index();
        assert_eq!(top.position, 10 % 4);
        assert_eq!(top.stamp, 10 / 4);
    }

    #[test]
    fn test_stale_top_cannot_win_after_slot_reuse() {
        let deque = ConcurrentDeque::with_capacity(2);
        deque.push_bottom(TaskHandle(1)).unwrap();
        let stale = deque.top.load(Ordering::Acquire);

        // the slot at `stale` is drained and refilled one lap later
        assert_eq!(deque.pop_top(), Some(TaskHandle(1)));
        deque.push_bottom(TaskHandle(2)).unwrap();
        assert_eq!(deque.pop_top(), Some(TaskHandle(2)));
        deque.push_bottom(TaskHandle(3)).unwrap();
        assert_eq!(deque.slot(stale).load(Ordering::Relaxed), 3);

        assert!(deque
            .top
            .compare_exchange(stale, stale + 1, Ordering::SeqCst, Ordering::Relaxed)
            .is_err());
        assert_eq!(deque.pop_bottom(), Some(TaskHandle(3)));
    }

    #[test]
    fn test_size_stays_within_occupancy_under_contention() {
        const ROUNDS: u64 = 500;
        const BATCH: u64 = 8;
        let deque = Arc::new(ConcurrentDeque::with_capacity(1024));
        let done = Arc::new(AtomicBool::new(false));

        let (popped, stolen) = std::thread::scope(|s| {
            let observer = s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let size = deque.size();
                    assert!(size <= BATCH as usize, "size {size} above occupancy bound");
                }
            });
            let thief = s.spawn(|| {
                let mut stolen = 0u64;
                while !done.load(Ordering::Acquire) {
                    if deque.pop_top().is_some() {
                        stolen += 1;
                    }
                }
                stolen
            });

            let mut popped = 0u64;
            for round in 0..ROUNDS {
                for i in 0..BATCH {
                    deque.push_bottom(TaskHandle(round * BATCH + i)).unwrap();
                }
                // a None here means the deque is empty again; the thief may
                // have won the last handle
                while deque.pop_bottom().is_some() {
                    popped += 1;
                }
            }
            done.store(true, Ordering::Release);
            observer.join().unwrap();
            (popped, thief.join().unwrap())
        });

        assert_eq!(popped + stolen, ROUNDS * BATCH);
        assert_eq!(deque.size(), 0);
    }

    #[test]
    fn test_concurrent_pops_return_each_handle_exactly_once() {
        const ITEMS: u64 = 20_000;
        const THIEVES: usize = 4;

        let deque = Arc::new(ConcurrentDeque::with_capacity(1 << 15));
        let barrier = Arc::new(Barrier::new(THIEVES + 1));
        let owner_done = Arc::new(AtomicBool::new(false));

        let mut thieves = Vec::new();
        for _ in 0..THIEVES {
            let deque = Arc::clone(&deque);
            let barrier = Arc::clone(&barrier);
            let owner_done = Arc::clone(&owner_done);
            thieves.push(std::thread::spawn(move || {
                let mut stolen = Vec::new();
                barrier.wait();
                loop {
                    match deque.pop_top() {
                        Some(h) => stolen.push(h.0),
                        None if owner_done.load(Ordering::Acquire) && deque.is_empty() => break,
                        None => std::hint::spin_loop(),
                    }
                }
                stolen
            }));
        }

        barrier.wait();
        let mut popped = Vec::new();
        for i in 0..ITEMS {
            deque.push_bottom(TaskHandle(i)).unwrap();
            if i % 3 == 0 {
                if let Some(h) = deque.pop_bottom() {
                    popped.push(h.0);
                }
            }
        }
        while let Some(h) = deque.pop_bottom() {
            popped.push(h.0);
        }
        owner_done.store(true, Ordering::Release);

        let mut all = popped;
        for thief in thieves {
            all.extend(thief.join().unwrap());
        }

        assert_eq!(all.len() as u64, ITEMS, "a handle was lost or duplicated");
        let unique: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(unique.len() as u64, ITEMS);
    }

    #[test]
    fn test_last_element_race_has_single_winner() {
        for round in 0..2_000u64 {
            let deque = Arc::new(ConcurrentDeque::with_capacity(4));
            deque.push_bottom(TaskHandle(round)).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let thief = {
                let deque = Arc::clone(&deque);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    deque.pop_top()
                })
            };
            barrier.wait();
            let mine = deque.pop_bottom();
            let theirs = thief.join().unwrap();

            match (mine, theirs) {
                (Some(h), None) | (None, Some(h)) => assert_eq!(h, TaskHandle(round)),
                other => panic!("round {round}: expected exactly one winner, got {other:?}"),
            }
            assert!(deque.is_empty());
        }
    }
}
