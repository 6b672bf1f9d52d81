//! Concurrent MPSC queue tests

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use flog::ConcurrentQueue;

#[test]
fn test_empty_queue_unchanged_by_dequeue() {
    let mut queue: ConcurrentQueue<String> = ConcurrentQueue::new();

    for _ in 0..3 {
        assert_eq!(queue.try_dequeue(), None);
    }
    assert_eq!(queue.size(), 0);

    queue.enqueue("x".to_string());
    assert_eq!(queue.try_dequeue().as_deref(), Some("x"));
}

#[test]
fn test_concurrent_producers_no_loss_no_duplication() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 10_000;
    const TOTAL: usize = (PRODUCERS * PER_PRODUCER) as usize;

    let (producer, mut consumer) = ConcurrentQueue::<u64>::new().split();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let producer = producer.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    producer.enqueue((p << 32) | seq);
                }
            })
        })
        .collect();

    // Consume concurrently with the producers.
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut seen = HashSet::with_capacity(TOTAL);
    let mut last_seq = vec![None::<u64>; PRODUCERS as usize];

    while seen.len() < TOTAL {
        match consumer.try_dequeue() {
            Some(tag) => {
                assert!(seen.insert(tag), "duplicate tag {tag:#x}");

                // Per-producer FIFO order is preserved.
                let p = (tag >> 32) as usize;
                let seq = tag & 0xFFFF_FFFF;
                if let Some(prev) = last_seq[p] {
                    assert!(seq > prev, "producer {p}: {seq} after {prev}");
                }
                last_seq[p] = Some(seq);
            }
            None => {
                assert!(Instant::now() < deadline, "only {} of {TOTAL} tags", seen.len());
                thread::yield_now();
            }
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(consumer.try_dequeue(), None);
    assert_eq!(seen.len(), TOTAL);
    assert_eq!(consumer.size(), 0);
}

#[test]
fn test_size_tracks_quiescent_queue() {
    let (producer, mut consumer) = ConcurrentQueue::new().split();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let producer = producer.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    producer.enqueue(i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Once all producers are joined the approximation is exact.
    assert_eq!(producer.size(), 1_000);

    let mut drained = 0;
    while consumer.try_dequeue().is_some() {
        drained += 1;
    }
    assert_eq!(drained, 1_000);
    assert_eq!(consumer.size(), 0);
}
