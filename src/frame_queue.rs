//! The thread-safe, bounded buffer between the acquisition thread and
//! whoever consumes sensor samples.

use crate::config::BackpressurePolicy;

use log::debug;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Condvar, Mutex,
    },
    time::{Duration, Instant},
};

// Larger queues allocate as they fill.
const PREALLOCATE_MAX: usize = 1024;

/// What happened to an item handed to [FrameQueue::push()].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued with room to spare.
    Queued,
    /// Queued after evicting the oldest item.
    DroppedOldest,
    /// Not queued; the queue was full.
    DroppedNewest,
}

/// A FIFO with a fixed capacity that never blocks the producer. When full,
/// the [BackpressurePolicy] decides which item is lost, and every loss is
/// counted in [FrameQueue::dropped()].
#[derive(Debug)]
pub struct FrameQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
    capacity: usize,
    policy: BackpressurePolicy,
    dropped: AtomicU64,
}

impl<T> FrameQueue<T> {
    /// Instantiate an empty queue. A capacity of zero is bumped to one.
    /// Storage grows on demand, up to `capacity` items.
    pub fn new(capacity: usize, policy: BackpressurePolicy) -> Self {
        let capacity = capacity.max(1);
        FrameQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(PREALLOCATE_MAX))),
            ready: Condvar::new(),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Insert an item without ever waiting.
    pub fn push(&self, item: T) -> PushOutcome {
        let mut items = self.items.lock().unwrap();

        let outcome = if items.len() < self.capacity {
            items.push_back(item);
            PushOutcome::Queued
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match self.policy {
                BackpressurePolicy::DropOldest => {
                    items.pop_front();
                    items.push_back(item);
                    PushOutcome::DroppedOldest
                }
                BackpressurePolicy::DropNewest => PushOutcome::DroppedNewest,
            }
        };
        drop(items);

        if outcome != PushOutcome::Queued {
            debug!("Frame queue full: {:?}", outcome);
        }
        if outcome != PushOutcome::DroppedNewest {
            self.ready.notify_one();
        }
        outcome
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive. A
    /// timeout too large to form a deadline, such as [Duration::MAX], waits
    /// until an item arrives.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now().checked_add(timeout);
        let mut items = self.items.lock().unwrap();

        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            items = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    self.ready.wait_timeout(items, remaining).unwrap().0
                }
                None => self.ready.wait(items).unwrap(),
            };
        }
    }

    /// Take the oldest item if there is one.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    /// Throw away everything queued.
    pub fn clear(&self) {
        self.items.lock().unwrap().clear();
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items lost to backpressure since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn fifo_order() {
        let q = FrameQueue::new(4, BackpressurePolicy::DropOldest);
        for i in 0..3 {
            assert_eq!(q.push(i), PushOutcome::Queued);
        }
        assert_eq!(q.try_pop(), Some(0));
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn drop_oldest_keeps_newest() {
        let q = FrameQueue::new(3, BackpressurePolicy::DropOldest);
        let outcomes: Vec<_> = (0..5).map(|i| q.push(i)).collect();

        assert_eq!(outcomes[3], PushOutcome::DroppedOldest);
        assert_eq!(q.dropped(), 2);
        assert_eq!(q.len(), 3);
        let left: Vec<_> = std::iter::from_fn(|| q.try_pop()).collect();
        assert_eq!(left, vec![2, 3, 4]);
    }

    #[test]
    fn drop_newest_keeps_oldest() {
        let q = FrameQueue::new(3, BackpressurePolicy::DropNewest);
        let outcomes: Vec<_> = (0..5).map(|i| q.push(i)).collect();

        assert_eq!(outcomes[4], PushOutcome::DroppedNewest);
        assert_eq!(q.dropped(), 2);
        let left: Vec<_> = std::iter::from_fn(|| q.try_pop()).collect();
        assert_eq!(left, vec![0, 1, 2]);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let q: FrameQueue<u8> = FrameQueue::new(1, BackpressurePolicy::DropOldest);
        let start = Instant::now();

        assert_eq!(q.pop_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn pop_wakes_on_push() {
        let q = Arc::new(FrameQueue::new(2, BackpressurePolicy::DropOldest));
        let producer = Arc::clone(&q);

        let th = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.push(42u32);
        });

        assert_eq!(q.pop_timeout(Duration::from_secs(5)), Some(42));
        th.join().unwrap();
    }

    #[test]
    fn pop_without_deadline_waits_for_push() {
        let q = Arc::new(FrameQueue::new(2, BackpressurePolicy::DropOldest));
        let producer = Arc::clone(&q);

        let th = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.push(7u32);
        });

        assert_eq!(q.pop_timeout(Duration::MAX), Some(7));
        th.join().unwrap();

        q.push(8);
        assert_eq!(q.pop_timeout(Duration::MAX), Some(8));
    }

    #[test]
    fn huge_capacity_does_not_preallocate() {
        let q = FrameQueue::new(usize::MAX, BackpressurePolicy::DropNewest);
        assert_eq!(q.capacity(), usize::MAX);
        assert_eq!(q.push(1u8), PushOutcome::Queued);
        assert_eq!(q.try_pop(), Some(1));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let q = FrameQueue::new(0, BackpressurePolicy::DropOldest);
        q.push(1);
        q.push(2);
        assert_eq!(q.capacity(), 1);
        assert_eq!(q.try_pop(), Some(2));
        q.push(3);
        q.clear();
        assert!(q.is_empty());
    }
}
