//! Wake primitive tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flog::WakeEvent;

#[test]
fn test_signals_from_many_threads_collapse_to_one_wake() {
    let event = Arc::new(WakeEvent::new());

    let signalers: Vec<_> = (0..8)
        .map(|_| {
            let event = Arc::clone(&event);
            thread::spawn(move || event.signal())
        })
        .collect();
    for s in signalers {
        s.join().unwrap();
    }

    event.wait();
    assert!(!event.try_wait(), "all eight signals must collapse into one");
}

#[test]
fn test_exactly_one_wake_per_collapsed_burst() {
    let event = Arc::new(WakeEvent::new());
    let wakes = Arc::new(AtomicUsize::new(0));

    // Two rapid signals before any wait().
    event.signal();
    event.signal();

    let waiter = {
        let event = Arc::clone(&event);
        let wakes = Arc::clone(&wakes);
        thread::spawn(move || {
            for _ in 0..2 {
                event.wait();
                wakes.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while wakes.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "waiter never woke");
        thread::sleep(Duration::from_millis(1));
    }

    // The second wait must still be blocked.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(wakes.load(Ordering::SeqCst), 1);

    event.signal();
    waiter.join().unwrap();
    assert_eq!(wakes.load(Ordering::SeqCst), 2);
}

#[test]
fn test_try_wait_without_signal() {
    let event = WakeEvent::new();
    assert!(!event.try_wait());
    assert!(!event.is_set());

    event.signal();
    assert!(event.is_set());
    assert!(event.try_wait());
}
