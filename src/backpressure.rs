//! Overload policy for the log queue.
//!
//! # Philosophy
//!
//! > Losing some log lines is better than losing the process.
//!
//! When the consumer cannot keep up, the queue would grow without bound.
//! Instead, producers start shedding at the high watermark and resume only
//! once the queue has drained below the low watermark. The gap between the
//! two is the hysteresis band that stops the policy flapping at a single
//! threshold.
//!
//! ```text
//!  queue size
//!      │        ┌─ engage (one "limit reached" record)
//!  HIGH┤───────●━━━━━━━━━━━━━━┓   shedding
//!      │      ╱                ┃
//!      │     ╱                 ┃
//!   LOW┤────╱──────────────────●── resume (one "cleared" record)
//!      └──────────────────────────▶ time
//! ```

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Outcome of admitting one incoming record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Normal path: enqueue the record.
    Accept,
    /// This caller cleared backpressure: enqueue the "cleared" notice,
    /// then the record.
    Resume,
    /// This caller engaged backpressure: enqueue the "limit reached"
    /// notice, drop the record.
    Engage,
    /// Shedding: drop the record silently.
    Drop,
}

/// Thread-safe backpressure state.
///
/// The `active` flag transitions with compare-and-swap so that exactly one
/// producer wins each transition and emits the bracket notice.
#[derive(Debug)]
pub struct Backpressure {
    high_watermark: usize,
    low_watermark: usize,

    /// True while shedding.
    active: AtomicBool,

    /// Records dropped since creation (never cleared).
    dropped: AtomicU64,

    /// Number of times shedding was engaged (never cleared).
    engaged: AtomicU32,
}

impl Backpressure {
    /// Create an inactive policy. Caller guarantees `high > low`.
    pub const fn new(high_watermark: usize, low_watermark: usize) -> Self {
        Self {
            high_watermark,
            low_watermark,
            active: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            engaged: AtomicU32::new(0),
        }
    }

    /// Decide what to do with one incoming record, given the approximate
    /// current queue size.
    #[inline]
    pub fn admit(&self, queue_size: usize) -> Admission {
        if self.active.load(Ordering::Acquire) {
            if queue_size > self.low_watermark {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Admission::Drop;
            }
            return match self.active.compare_exchange(
                true,
                false,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => Admission::Resume,
                // Somebody else already resumed.
                Err(_) => Admission::Accept,
            };
        }

        if queue_size >= self.high_watermark {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return match self.active.compare_exchange(
                false,
                true,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.engaged.fetch_add(1, Ordering::Relaxed);
                    Admission::Engage
                }
                Err(_) => Admission::Drop,
            };
        }

        Admission::Accept
    }

    /// Check if shedding is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    #[inline]
    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }

    /// Get a snapshot of the counters.
    #[inline]
    pub fn snapshot(&self) -> BackpressureSnapshot {
        BackpressureSnapshot {
            active: self.is_active(),
            dropped: self.dropped.load(Ordering::Relaxed),
            engaged: self.engaged.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of backpressure state at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackpressureSnapshot {
    pub active: bool,
    /// Total records dropped, including the ones that engaged shedding.
    pub dropped: u64,
    /// Total number of times shedding was engaged.
    pub engaged: u32,
}
