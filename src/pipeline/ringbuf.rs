//! Bounded drop-oldest ring buffer for the frame pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

/// Fixed-capacity queue that evicts its oldest items instead of blocking
///
/// Safe for any mix of producers and consumers; callers never lock. The
/// length never exceeds the capacity and survivors keep their order.
pub struct DropOldestQueue<T> {
    name: &'static str,

    ring: Mutex<HeapRb<T>>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    written: AtomicUsize,
    read: AtomicUsize,
    evicted: AtomicUsize,
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub written: usize,
    pub read: usize,
    pub evicted: usize,
}

impl<T> DropOldestQueue<T> {
    /// # Panics
    ///
    /// If `capacity` is zero.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        assert!(capacity > 0, "queue `{name}` needs a non-zero capacity");
        Self {
            name,
            ring: Mutex::new(HeapRb::new(capacity)),
            stats: CachePadded::new(Stats::default()),
        }
    }

    fn ring(&self) -> MutexGuard<'_, HeapRb<T>> {
        // The ring holds no invariant a panicking holder could break.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item`, evicting the oldest item if the queue is full.
    ///
    /// Returns the evicted item, if any. Never blocks.
    pub fn enqueue(&self, item: T) -> Option<T> {
        let evicted = self.ring().push_overwrite(item);

        self.stats.written.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
            ::metrics::counter!("liveview_queue_evicted_total", "queue" => self.name).increment(1);
        }
        evicted
    }

    /// Remove and return the oldest item. Never blocks.
    pub fn dequeue(&self) -> Option<T> {
        let item = self.ring().try_pop();
        if item.is_some() {
            self.stats.read.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Drop everything currently queued, returning how many items went.
    pub fn clear(&self) -> usize {
        let mut ring = self.ring();
        Consumer::clear(&mut *ring)
    }

    pub fn len(&self) -> usize {
        self.ring().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring().capacity().get()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            written: self.stats.written.load(Ordering::Relaxed),
            read: self.stats.read.load(Ordering::Relaxed),
            evicted: self.stats.evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn drain<T>(queue: &DropOldestQueue<T>) -> Vec<T> {
        std::iter::from_fn(|| queue.dequeue()).collect()
    }

    #[test]
    fn keeps_last_items_in_order_on_overflow() {
        let queue = DropOldestQueue::new("raw", 3);
        for i in 1..=10 {
            queue.enqueue(i);
            assert!(queue.len() <= 3);
        }

        assert_eq!(drain(&queue), vec![8, 9, 10]);
        assert_eq!(
            queue.stats(),
            QueueStats {
                written: 10,
                read: 3,
                evicted: 7
            }
        );
    }

    #[test]
    fn enqueue_returns_evicted_item() {
        let queue = DropOldestQueue::new("processed", 2);
        assert_eq!(queue.enqueue('a'), None);
        assert_eq!(queue.enqueue('b'), None);
        assert_eq!(queue.enqueue('c'), Some('a'));
        assert_eq!(queue.dequeue(), Some('b'));
    }

    #[test]
    fn interleaved_operations_preserve_fifo() {
        let queue = DropOldestQueue::new("raw", 3);
        queue.enqueue(1);
        queue.enqueue(2);
        assert_eq!(queue.dequeue(), Some(1));
        queue.enqueue(3);
        queue.enqueue(4);
        queue.enqueue(5);
        assert_eq!(drain(&queue), vec![3, 4, 5]);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn clear_empties_queue() {
        let queue = DropOldestQueue::new("raw", 3);
        queue.enqueue(1);
        queue.enqueue(2);

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 3);
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let queue = Arc::new(DropOldestQueue::new("processed", 2));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..1_000 {
                        queue.enqueue(p * 1_000 + i);
                        assert!(queue.len() <= 2);
                    }
                })
            })
            .collect();

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = 0;
                for _ in 0..2_000 {
                    if queue.dequeue().is_some() {
                        seen += 1;
                    }
                }
                seen
            })
        };

        for producer in producers {
            producer.join().unwrap();
        }
        let consumed = consumer.join().unwrap();

        let stats = queue.stats();
        assert_eq!(stats.written, 4_000);
        assert!(queue.len() <= 2);
        assert_eq!(stats.read, consumed);
        // every written item was either read, evicted or is still queued
        assert_eq!(stats.read + stats.evicted + queue.len(), stats.written);
    }
}
