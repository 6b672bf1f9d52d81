//! Log record model and call-site macros.
//!
//! # Architecture
//!
//! ```text
//! Producer threads        AsyncLogService              Consumer thread
//! ────────────────        ───────────────              ───────────────
//!
//! flog_info!() ───────▶  [R0]─▶[R1]─▶[R2] ──────────▶ sort by timestamp
//! timestamp first         lock-free MPSC               ──▶ Sink::render
//! never blocks            backpressure bounded         one thread at a time
//! ```
//!
//! # Rules
//!
//! - The timestamp is captured before the message is formatted
//! - A record is immutable after construction
//! - Producers never see an error from logging

use core::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Log severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Severity {
    /// Fixed-width label for output.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO ",
            Severity::Warn => "WARN ",
            Severity::Error => "ERROR",
        }
    }
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str().trim_end())
    }
}

impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Severity::Error,
            log::Level::Warn => Severity::Warn,
            log::Level::Info => Severity::Info,
            log::Level::Debug | log::Level::Trace => Severity::Debug,
        }
    }
}

/// A single log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    severity: Severity,
    message: String,
    timestamp: Instant,
    trace: Option<String>,
    producer_id: u32,
}

impl LogRecord {
    /// Build a record attributed to the calling thread.
    pub fn new(severity: Severity, message: impl Into<String>, timestamp: Instant) -> Self {
        Self {
            severity,
            message: message.into(),
            timestamp,
            trace: None,
            producer_id: thread_id(),
        }
    }

    /// Attach a pre-rendered failure trace.
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Override the producer id (mainly for replaying foreign records).
    pub fn with_producer_id(mut self, producer_id: u32) -> Self {
        self.producer_id = producer_id;
        self
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Capture time at the call site (monotonic).
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    #[inline]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Diagnostic id of the thread that created the record.
    #[inline]
    pub fn producer_id(&self) -> u32 {
        self.producer_id
    }
}

/// Small process-wide id of the calling thread.
///
/// Allocated on first call from each thread, starting at 0, and stable for
/// the thread's lifetime. Ids are never reused.
#[inline]
pub fn thread_id() -> u32 {
    static NEXT_ID: AtomicU32 = AtomicU32::new(0);

    thread_local! {
        static THREAD_ID: u32 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }

    THREAD_ID.with(|id| *id)
}

/// Log through an [`AsyncLogService`](crate::AsyncLogService).
///
/// The timestamp is taken before the arguments are formatted, and a panic
/// while formatting is caught and replaced by a fallback message.
///
/// # Example
///
/// ```ignore
/// flog!(service, Severity::Info, "tuned to {} Hz", freq);
/// ```
#[macro_export]
macro_rules! flog {
    ($service:expr, $severity:expr, $($arg:tt)*) => {
        $service.submit_with($severity, || ::std::format!($($arg)*))
    };
}

/// Debug-level log.
#[macro_export]
macro_rules! flog_debug {
    ($service:expr, $($arg:tt)*) => {
        $crate::flog!($service, $crate::logging::Severity::Debug, $($arg)*)
    };
}

/// Info-level log.
#[macro_export]
macro_rules! flog_info {
    ($service:expr, $($arg:tt)*) => {
        $crate::flog!($service, $crate::logging::Severity::Info, $($arg)*)
    };
}

/// Warning log.
#[macro_export]
macro_rules! flog_warn {
    ($service:expr, $($arg:tt)*) => {
        $crate::flog!($service, $crate::logging::Severity::Warn, $($arg)*)
    };
}

/// Error log.
#[macro_export]
macro_rules! flog_error {
    ($service:expr, $($arg:tt)*) => {
        $crate::flog!($service, $crate::logging::Severity::Error, $($arg)*)
    };
}
