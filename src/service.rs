//! Asynchronous log service.
//!
//! # Architecture
//!
//! ```text
//! Producers                 Shared                       Consumer thread
//! ─────────                 ──────                       ───────────────
//!
//! submit() ─▶ Backpressure ─▶ ConcurrentQueue ─┐
//! submit() ─▶    admit()   ─▶   (lock-free)    ├─▶ wait() ─▶ drain_and_emit()
//! submit() ─▶              ─▶ WakeEvent.signal ┘             │ dequeue all
//!                                                            │ stable sort by ts
//!                                                            └ Sink::render × N
//! ```
//!
//! # Rules
//!
//! - `submit*` never fails and never blocks, except on the drain lock
//!   when no consumer thread is running (inline delivery)
//! - `drain_and_emit` is mutually exclusive; the sink is never called from
//!   two threads at once
//! - A sink that logs from inside `render`/`flush` never deadlocks: the
//!   nested drain is skipped and the outer drain picks the record up
//! - Sink panics never reach the caller of `submit*`, `flush` or `stop`
//! - Within one batch, records reach the sink in capture-time order
//! - `stop()` joins the consumer and drains once more, so nothing accepted
//!   before `stop()` returns is left behind

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Mutex, ReentrantMutex};

use crate::backpressure::{Admission, Backpressure, BackpressureSnapshot};
use crate::config::LoggerConfig;
use crate::error::{LogError, Result};
use crate::logging::{thread_id, LogRecord, Severity};
use crate::queue::{ConcurrentQueue, Consumer, Producer};
use crate::sink::Sink;
use crate::wake::WakeEvent;

/// Synthetic warning emitted once when shedding starts.
pub const BACKPRESSURE_ENGAGED_MSG: &str = "Logger backpressure limit reached";

/// Synthetic warning emitted once when shedding stops.
pub const BACKPRESSURE_CLEARED_MSG: &str = "Logger backpressure cleared";

/// Debug notice emitted after the consumer thread has been joined.
pub const STOPPED_MSG: &str = "logger stopped";

/// Prefix of records reporting a sink failure or consumer panic.
pub const INTERNAL_ERROR_PREFIX: &str = "[flog internal error]";

/// Upper bound on dequeue passes per drain. Only a sink that logs on every
/// render keeps refilling the queue; the rest waits for the next drain.
const MAX_DRAIN_PASSES: usize = 64;

thread_local! {
    /// Set while a sink failure is being reported on this thread.
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// Everything only the draining thread may touch.
struct Drain {
    consumer: Consumer<LogRecord>,
    sink: Box<dyn Sink>,
}

/// State shared between the service handle and the consumer thread.
struct Shared {
    event: WakeEvent,
    queue: Producer<LogRecord>,
    /// Reentrant so a sink logging on the draining thread finds the drain
    /// busy (`try_borrow_mut` fails) instead of deadlocking.
    drain: ReentrantMutex<RefCell<Drain>>,
    running: AtomicBool,
    backpressure: Backpressure,
    internal_errors: AtomicU64,
}

impl Shared {
    fn submit(&self, record: LogRecord) {
        match self.backpressure.admit(self.queue.size()) {
            Admission::Accept => self.queue.enqueue(record),
            Admission::Resume => {
                self.queue.enqueue(LogRecord::new(
                    Severity::Warn,
                    BACKPRESSURE_CLEARED_MSG,
                    record.timestamp(),
                ));
                self.queue.enqueue(record);
            }
            Admission::Engage => {
                self.queue.enqueue(LogRecord::new(
                    Severity::Warn,
                    BACKPRESSURE_ENGAGED_MSG,
                    record.timestamp(),
                ));
            }
            Admission::Drop => return,
        }

        self.event.signal();

        // Pairs with the fence in stop(): either stop's final drain sees our
        // record, or we see `running == false` and drain it ourselves.
        fence(Ordering::SeqCst);

        // Outside the Running window nobody else will drain: do it here.
        if !self.running.load(Ordering::Acquire) {
            self.drain_and_emit();
        }
    }

    fn drain_and_emit(&self) {
        let guard = self.drain.lock();
        // Already draining further up this thread's stack (a sink logging
        // from inside render/flush). That drain loops and takes the record.
        let Ok(mut drain) = guard.try_borrow_mut() else {
            return;
        };
        let Drain { consumer, sink } = &mut *drain;

        for _ in 0..MAX_DRAIN_PASSES {
            let mut batch = Vec::new();
            while let Some(record) = consumer.try_dequeue() {
                batch.push(record);
            }
            if batch.is_empty() {
                return;
            }

            // Stable: equal timestamps keep enqueue order.
            batch.sort_by_key(LogRecord::timestamp);

            for record in &batch {
                self.emit(&mut **sink, record);
            }
            self.flush_sink(&mut **sink);
        }
    }

    fn flush_sink(&self, sink: &mut dyn Sink) {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| sink.flush())) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        self.report_failure(sink, "failed to flush sink", &failure);
    }

    fn emit(&self, sink: &mut dyn Sink, record: &LogRecord) {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| sink.render(record))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        let what = format!("failed to render {} record", record.severity());
        self.report_failure(sink, &what, &failure);
    }

    /// Best-effort report of a sink failure through the same sink.
    ///
    /// If rendering the report fails as well, it is counted and dropped.
    fn report_failure(&self, sink: &mut dyn Sink, what: &str, failure: &str) {
        self.internal_errors.fetch_add(1, Ordering::Relaxed);

        REPORTING.with(|reporting| {
            if reporting.replace(true) {
                return;
            }
            let report = LogRecord::new(
                Severity::Error,
                format!("{INTERNAL_ERROR_PREFIX} {what}: {failure}"),
                Instant::now(),
            );
            self.emit(sink, &report);
            reporting.set(false);
        });
    }
}

/// Consumer thread body.
fn run_consumer(shared: Arc<Shared>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        while shared.running.load(Ordering::Acquire) {
            shared.event.wait();
            shared.drain_and_emit();
        }
    }));

    if let Err(payload) = outcome {
        // Behave as if the thread had exited: producers fall back to inline
        // delivery, and the panic itself goes through the normal path.
        shared.running.store(false, Ordering::Release);
        shared.internal_errors.fetch_add(1, Ordering::Relaxed);
        let report = LogRecord::new(
            Severity::Error,
            format!(
                "{INTERNAL_ERROR_PREFIX} log consumer thread panicked: {}",
                panic_message(payload.as_ref())
            ),
            Instant::now(),
        );
        if panic::catch_unwind(AssertUnwindSafe(|| shared.submit(report))).is_err() {
            shared.internal_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    if panic::catch_unwind(AssertUnwindSafe(|| shared.drain_and_emit())).is_err() {
        shared.internal_errors.fetch_add(1, Ordering::Relaxed);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Point-in-time service statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceStats {
    pub running: bool,
    /// Approximate number of queued records.
    pub queued: usize,
    pub backpressure: BackpressureSnapshot,
    /// Sink render/flush failures, including failed reports, plus consumer
    /// thread panics.
    pub internal_errors: u64,
}

/// Lock-free asynchronous logger.
///
/// Producers on any thread call `submit*`. Between [`start`](Self::start)
/// and [`stop`](Self::stop), a dedicated consumer thread batches, sorts and
/// renders records; outside that window each `submit*` delivers inline.
///
/// # Example
///
/// ```ignore
/// let service = AsyncLogService::new(&LoggerConfig::default(), ConsoleSink::stderr(true))?;
/// service.start()?;
/// flog_info!(service, "sample rate {} Hz", rate);
/// service.stop();
/// ```
pub struct AsyncLogService {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

impl AsyncLogService {
    /// Create a stopped service delivering to `sink`.
    pub fn new(config: &LoggerConfig, sink: impl Sink + 'static) -> Result<Self> {
        config.validate()?;

        // The constructing (usually main) thread gets the first id.
        thread_id();

        let (queue, consumer) = ConcurrentQueue::new().split();
        let shared = Shared {
            event: WakeEvent::new(),
            queue,
            drain: ReentrantMutex::new(RefCell::new(Drain {
                consumer,
                sink: Box::new(sink),
            })),
            running: AtomicBool::new(false),
            backpressure: Backpressure::new(config.high_watermark, config.low_watermark),
            internal_errors: AtomicU64::new(0),
        };

        Ok(Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
            thread_name: config.thread_name.clone(),
        })
    }

    /// Spawn the consumer thread.
    ///
    /// Also restarts a consumer that died from a panic; the dead thread is
    /// joined first, after it has delivered its report.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            // Only the consumer itself clears `running` while a handle is
            // held (stop() takes the handle under this lock).
            if self.shared.running.load(Ordering::Acquire) {
                *worker = Some(handle);
                return Err(LogError::AlreadyRunning);
            }
            self.join_worker(handle);
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run_consumer(shared));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                Err(LogError::Spawn(err))
            }
        }
    }

    /// Stop the consumer thread and deliver everything still queued.
    ///
    /// Cooperative: returns once the consumer has observed the stop on its
    /// next wake. Safe to call more than once, or without `start()`.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();

        self.shared.running.store(false, Ordering::Release);
        fence(Ordering::SeqCst);
        self.shared.event.signal();

        let joined = match worker.take() {
            Some(handle) => {
                self.join_worker(handle);
                true
            }
            None => false,
        };

        // Final safeguard for records enqueued after the last wake.
        self.shared.drain_and_emit();

        if joined {
            self.submit(Severity::Debug, STOPPED_MSG);
        }
    }

    fn join_worker(&self, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            self.shared.internal_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Check whether the consumer thread is currently running.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Submit a fully built record.
    #[inline]
    pub fn submit_record(&self, record: LogRecord) {
        self.shared.submit(record);
    }

    /// Submit a message, timestamped now.
    #[inline]
    pub fn submit(&self, severity: Severity, message: impl Into<String>) {
        let timestamp = Instant::now();
        self.shared.submit(LogRecord::new(severity, message, timestamp));
    }

    /// Submit with an explicit capture time and optional trace.
    pub fn submit_at(
        &self,
        severity: Severity,
        message: impl Into<String>,
        timestamp: Instant,
        trace: Option<String>,
    ) {
        let mut record = LogRecord::new(severity, message, timestamp);
        if let Some(trace) = trace {
            record = record.with_trace(trace);
        }
        self.shared.submit(record);
    }

    /// Submit a lazily built message.
    ///
    /// The timestamp is captured before `build` runs. If `build` panics, the
    /// panic is contained here and a fallback message is logged instead.
    pub fn submit_with<F>(&self, severity: Severity, build: F)
    where
        F: FnOnce() -> String,
    {
        let timestamp = Instant::now();
        let message = match panic::catch_unwind(AssertUnwindSafe(build)) {
            Ok(message) => message,
            Err(payload) => format!(
                "[message construction panicked: {}]",
                panic_message(payload.as_ref())
            ),
        };
        self.shared.submit(LogRecord::new(severity, message, timestamp));
    }

    /// Log an error with its source chain.
    ///
    /// A backtrace is attached when capture is enabled (`RUST_BACKTRACE`).
    pub fn submit_error(&self, err: &(dyn std::error::Error + 'static)) {
        let timestamp = Instant::now();

        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        let mut record = LogRecord::new(Severity::Error, message, timestamp);
        let trace = Backtrace::capture();
        if trace.status() == BacktraceStatus::Captured {
            record = record.with_trace(trace.to_string());
        }
        self.shared.submit(record);
    }

    /// Deliver everything queued right now, on the calling thread.
    pub fn flush(&self) {
        self.shared.drain_and_emit();
    }

    /// Get a snapshot of the service counters.
    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            running: self.is_running(),
            queued: self.shared.queue.size(),
            backpressure: self.shared.backpressure.snapshot(),
            internal_errors: self.shared.internal_errors.load(Ordering::Relaxed),
        }
    }

    /// Wrap in a guard that stops the service when dropped.
    pub fn guard(self: &Arc<Self>) -> LoggerGuard {
        LoggerGuard {
            service: Arc::clone(self),
        }
    }
}

impl Drop for AsyncLogService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Scope guard: stops the service on drop, including during unwinding.
#[must_use = "dropping the guard stops the logger"]
pub struct LoggerGuard {
    service: Arc<AsyncLogService>,
}

impl LoggerGuard {
    /// Shared handle to pass to call sites.
    pub fn service(&self) -> &Arc<AsyncLogService> {
        &self.service
    }
}

impl Deref for LoggerGuard {
    type Target = AsyncLogService;

    fn deref(&self) -> &AsyncLogService {
        &self.service
    }
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        self.service.stop();
    }
}
