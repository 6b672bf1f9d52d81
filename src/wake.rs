//! Single-consumer wake primitive with coalesced signals.
//!
//! # Architecture
//!
//! ```text
//! Producers              WakeEvent              Consumer
//! ─────────              ─────────              ────────
//!
//! signal() ──┐
//! signal() ──┼────────▶  flag 0 → 1  ──────────▶ wait() → flag 1 → 0
//! signal() ──┘           (one wake)              then drain EVERYTHING
//! ```
//!
//! Only the producer that flips the flag from 0 to 1 pays for an OS wake.
//! Collapsing signals is sound because the consumer drains the whole queue
//! after every wake, never a single item.
//!
//! # Backends
//!
//! - Linux / Android: private futex on the flag word (`libc`).
//! - Everything else, or with the `condvar-wake` feature: mutex + condvar.

use core::sync::atomic::{AtomicU32, Ordering};

/// Auto-reset event for exactly one waiting thread.
///
/// `signal()` may be called from any number of threads and never blocks.
/// `wait()` must only ever be called from one thread at a time.
pub struct WakeEvent {
    /// 0 = not set, 1 = set.
    flag: AtomicU32,
    parker: imp::Parker,
}

impl WakeEvent {
    /// Create a new event in the unsignaled state.
    pub fn new() -> Self {
        Self {
            flag: AtomicU32::new(0),
            parker: imp::Parker::new(),
        }
    }

    /// Set the event, waking the consumer if it was not already set.
    ///
    /// Lock-free on the futex backend. Never blocks.
    #[inline]
    pub fn signal(&self) {
        // AcqRel: publish everything written before this call to the consumer
        // and observe the consumer's last reset.
        if self.flag.swap(1, Ordering::AcqRel) == 0 {
            self.parker.unpark(&self.flag);
        }
    }

    /// Block until the event is set, then reset it.
    ///
    /// All signals that arrived before the reset are consumed by this call.
    pub fn wait(&self) {
        while self.flag.load(Ordering::Acquire) == 0 {
            self.parker.park(&self.flag);
        }
        // RMW rather than a plain store: it reads the value written by the
        // latest signal() and so acquires everything that producer published.
        self.flag.swap(0, Ordering::AcqRel);
    }

    /// Consume a pending signal without blocking.
    ///
    /// Returns `true` if the event was set.
    #[inline]
    pub fn try_wait(&self) -> bool {
        self.flag.swap(0, Ordering::AcqRel) != 0
    }

    /// Check whether a signal is pending, without consuming it.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire) != 0
    }
}

impl Default for WakeEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for WakeEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WakeEvent")
            .field("set", &self.is_set())
            .finish()
    }
}

#[cfg(all(
    any(target_os = "linux", target_os = "android"),
    not(feature = "condvar-wake")
))]
mod imp {
    use core::ptr;
    use core::sync::atomic::AtomicU32;

    /// Report an unrecoverable futex failure and abort.
    #[cold]
    fn fatal(op: &str, err: std::io::Error) -> ! {
        eprintln!("{op} failed: {err}");
        std::process::abort()
    }

    /// Futex backend. The flag word itself is the futex, no extra state.
    pub(super) struct Parker;

    impl Parker {
        pub(super) fn new() -> Self {
            Parker
        }

        /// Sleep while `*flag == 0`.
        ///
        /// The kernel compares the word before sleeping, so a wake between
        /// our load and this call makes it return immediately.
        pub(super) fn park(&self, flag: &AtomicU32) {
            // SAFETY: `flag` is a live, aligned 32-bit word for the duration
            // of the call; FUTEX_WAIT only reads it.
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    flag as *const AtomicU32,
                    libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                    0u32,
                    ptr::null::<libc::timespec>(),
                )
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                match err.raw_os_error() {
                    // Value changed before sleep, or interrupted by a signal.
                    Some(libc::EAGAIN) | Some(libc::EINTR) => {}
                    _ => fatal("futex wait", err),
                }
            }
        }

        pub(super) fn unpark(&self, flag: &AtomicU32) {
            // SAFETY: as above; FUTEX_WAKE does not touch the word.
            let rc = unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    flag as *const AtomicU32,
                    libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                    1i32,
                )
            };
            if rc < 0 {
                fatal("futex wake", std::io::Error::last_os_error());
            }
        }
    }
}

#[cfg(not(all(
    any(target_os = "linux", target_os = "android"),
    not(feature = "condvar-wake")
)))]
mod imp {
    use core::sync::atomic::{AtomicU32, Ordering};
    use parking_lot::{Condvar, Mutex};

    /// Portable backend: condvar guarded by a mutex.
    ///
    /// Producers only take the mutex on the 0 → 1 transition, so the
    /// common (already signaled) path stays lock-free.
    pub(super) struct Parker {
        lock: Mutex<()>,
        cond: Condvar,
    }

    impl Parker {
        pub(super) fn new() -> Self {
            Self {
                lock: Mutex::new(()),
                cond: Condvar::new(),
            }
        }

        pub(super) fn park(&self, flag: &AtomicU32) {
            let mut guard = self.lock.lock();
            // Re-check under the lock: unpark() notifies while holding it,
            // so a signal cannot slip in between this check and the sleep.
            while flag.load(Ordering::Acquire) == 0 {
                self.cond.wait(&mut guard);
            }
        }

        pub(super) fn unpark(&self, _flag: &AtomicU32) {
            let _guard = self.lock.lock();
            self.cond.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_signal_then_wait_returns() {
        let event = WakeEvent::new();
        event.signal();
        event.wait();
        assert!(!event.is_set());
    }

    #[test]
    fn test_signals_coalesce() {
        let event = WakeEvent::new();
        event.signal();
        event.signal();

        assert!(event.try_wait());
        assert!(!event.try_wait(), "second signal must have been collapsed");
    }

    #[test]
    fn test_wait_blocks_until_signal() {
        let event = Arc::new(WakeEvent::new());
        let woke = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let event = Arc::clone(&event);
            let woke = Arc::clone(&woke);
            thread::spawn(move || {
                event.wait();
                woke.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(woke.load(Ordering::SeqCst), 0);

        event.signal();
        waiter.join().unwrap();
        assert_eq!(woke.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_lost_wakeups_under_contention() {
        const ROUNDS: usize = 2_000;

        let event = Arc::new(WakeEvent::new());
        let produced = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let event = Arc::clone(&event);
                let produced = Arc::clone(&produced);
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        produced.fetch_add(1, Ordering::SeqCst);
                        event.signal();
                    }
                })
            })
            .collect();

        // Consumer: every produced unit must eventually be observed after
        // some wake. A lost signal would leave us blocked forever.
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = 0;
        while seen < 4 * ROUNDS {
            event.wait();
            seen = produced.load(Ordering::SeqCst);
            assert!(Instant::now() < deadline, "consumer starved");
        }

        for p in producers {
            p.join().unwrap();
        }
    }
}
