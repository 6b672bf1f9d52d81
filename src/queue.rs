//! Lock-free MPSC (Multiple Producer, Single Consumer) FIFO queue.
//!
//! Intrusive linked list in the Michael–Scott / Vyukov style.
//!
//! # Architecture
//!
//! ```text
//!  tail (consumer only)                            head (producers swap)
//!   │                                                │
//!   ▼                                                ▼
//! [stub] ──next──▶ [rec 1] ──next──▶ [rec 2] ──▶ [rec 3] ──▶ null
//! ```
//!
//! # Rules
//!
//! - Any number of producers may `enqueue` concurrently
//! - Exactly one consumer dequeues; enforced by [`Consumer`] being unique
//! - A node's `next` is written by exactly one producer, once
//! - Nodes are freed only by the consumer (or by `Drop` when nobody is left)
//!
//! # Memory Ordering
//!
//! - Producer swaps `head` with `AcqRel`, then publishes with a `Release`
//!   store into the previous node's `next`
//! - Consumer loads `next` with `Acquire`, so the value is fully visible
//! - The length counter is `Relaxed`: a heuristic, never a correctness input

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};
use std::sync::Arc;

struct Node<T> {
    /// `None` only for the stub node at the consumer end.
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    /// Heap-allocate a node. Allocation failure aborts the process.
    fn alloc(value: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Unbounded lock-free MPSC queue.
///
/// Use directly with `&mut self` for single-threaded access, or
/// [`split`](ConcurrentQueue::split) it into a cloneable [`Producer`] and
/// a unique [`Consumer`] for concurrent use.
pub struct ConcurrentQueue<T> {
    /// Most recently enqueued node. Producers swap here.
    head: AtomicPtr<Node<T>>,
    /// Current stub node. Only the consumer touches this.
    tail: UnsafeCell<*mut Node<T>>,
    /// Approximate number of queued values. May transiently go negative.
    len: AtomicIsize,
}

// SAFETY: Values are moved between threads (T: Send). Producers only touch
// `head`, `len` and the `next` of the node they just displaced; `tail` is only
// accessed through `&mut self` or the unique `Consumer`.
unsafe impl<T: Send> Send for ConcurrentQueue<T> {}
unsafe impl<T: Send> Sync for ConcurrentQueue<T> {}

impl<T> ConcurrentQueue<T> {
    /// Create an empty queue (one stub node).
    pub fn new() -> Self {
        let stub = Node::alloc(None);
        Self {
            head: AtomicPtr::new(stub),
            tail: UnsafeCell::new(stub),
            len: AtomicIsize::new(0),
        }
    }

    /// Append a value. Lock-free, safe from any number of threads.
    ///
    /// # Timing
    ///
    /// One allocation, one atomic swap, one store. Never blocks.
    #[inline]
    pub fn enqueue(&self, value: T) {
        let node = Node::alloc(Some(value));
        let prev = self.head.swap(node, Ordering::AcqRel);
        // SAFETY: `prev` came out of `head`, so we are the only producer that
        // will ever write its `next`. The consumer cannot free it while its
        // `next` is still null, and it stays null until this store.
        unsafe { (*prev).next.store(node, Ordering::Release) };
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove the oldest value, if any.
    ///
    /// Returns `None` when the queue is empty (or a producer has swapped
    /// `head` but not yet linked its node). The queue is unchanged then.
    #[inline]
    pub fn try_dequeue(&mut self) -> Option<T> {
        // SAFETY: `&mut self` excludes any other consumer.
        unsafe { self.dequeue_unchecked() }
    }

    /// Approximate number of queued values.
    ///
    /// Can briefly disagree with what `try_dequeue` observes. Use only for
    /// heuristics such as backpressure thresholds.
    #[inline]
    pub fn size(&self) -> usize {
        let len = self.len.load(Ordering::Relaxed);
        if len < 0 {
            0
        } else {
            len as usize
        }
    }

    /// Split into a cloneable producer handle and the unique consumer.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let queue = Arc::new(self);
        (
            Producer {
                queue: Arc::clone(&queue),
            },
            Consumer { queue },
        )
    }

    /// Pop from the consumer end.
    ///
    /// # Safety
    ///
    /// No other thread may run `dequeue_unchecked` on this queue concurrently.
    unsafe fn dequeue_unchecked(&self) -> Option<T> {
        let tail = *self.tail.get();
        let next = (*tail).next.load(Ordering::Acquire);
        if next.is_null() {
            return None;
        }

        // `next` becomes the new stub; its value moves out to the caller.
        let value = (*next).value.take();
        *self.tail.get() = next;
        drop(Box::from_raw(tail));

        self.len.fetch_sub(1, Ordering::Relaxed);
        value
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ConcurrentQueue<T> {
    fn drop(&mut self) {
        // No handles remain, so the chain from the stub is quiescent.
        let mut node = *self.tail.get_mut();
        while !node.is_null() {
            // SAFETY: every node in the chain was created by `Node::alloc`
            // and is owned by the queue alone at this point.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next.load(Ordering::Relaxed);
        }
    }
}

/// Enqueue side of a split queue. Cheap to clone, one per producer thread.
pub struct Producer<T> {
    queue: Arc<ConcurrentQueue<T>>,
}

impl<T> Producer<T> {
    /// See [`ConcurrentQueue::enqueue`].
    #[inline]
    pub fn enqueue(&self, value: T) {
        self.queue.enqueue(value);
    }

    /// See [`ConcurrentQueue::size`].
    #[inline]
    pub fn size(&self) -> usize {
        self.queue.size()
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

/// Dequeue side of a split queue. There is exactly one per queue.
pub struct Consumer<T> {
    queue: Arc<ConcurrentQueue<T>>,
}

impl<T> Consumer<T> {
    /// See [`ConcurrentQueue::try_dequeue`].
    #[inline]
    pub fn try_dequeue(&mut self) -> Option<T> {
        // SAFETY: `Consumer` is not `Clone` and `split` creates only one, so
        // `&mut self` here is the single consumer of the queue.
        unsafe { self.queue.dequeue_unchecked() }
    }

    /// See [`ConcurrentQueue::size`].
    #[inline]
    pub fn size(&self) -> usize {
        self.queue.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dequeue_returns_none() {
        let mut queue: ConcurrentQueue<u32> = ConcurrentQueue::new();
        assert_eq!(queue.try_dequeue(), None);
        assert_eq!(queue.size(), 0);

        // Still usable afterwards
        queue.enqueue(7);
        assert_eq!(queue.try_dequeue(), Some(7));
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = ConcurrentQueue::new();
        for i in 0..10 {
            queue.enqueue(i);
        }
        assert_eq!(queue.size(), 10);

        for i in 0..10 {
            assert_eq!(queue.try_dequeue(), Some(i));
        }
        assert_eq!(queue.size(), 0);
    }

    #[test]
    fn test_drop_releases_pending_values() {
        use std::sync::atomic::AtomicUsize;

        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut queue = ConcurrentQueue::new();
        queue.enqueue(Tracked);
        queue.enqueue(Tracked);
        queue.enqueue(Tracked);
        drop(queue.try_dequeue());
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);

        drop(queue);
        assert_eq!(DROPS.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_split_handles_share_queue() {
        let (producer, mut consumer) = ConcurrentQueue::new().split();
        let other = producer.clone();

        producer.enqueue("a");
        other.enqueue("b");
        assert_eq!(consumer.size(), 2);

        assert_eq!(consumer.try_dequeue(), Some("a"));
        assert_eq!(consumer.try_dequeue(), Some("b"));
        assert_eq!(consumer.try_dequeue(), None);
    }

    #[test]
    fn test_consumer_outlives_producers() {
        let (producer, mut consumer) = ConcurrentQueue::new().split();
        producer.enqueue(String::from("late"));
        drop(producer);

        assert_eq!(consumer.try_dequeue().as_deref(), Some("late"));
    }
}
