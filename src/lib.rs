//! # flog
//!
//! Asynchronous logger with a lock-free MPSC hand-off.
//!
//! ## Architecture
//!
//! Producers never wait on I/O. Every record flows through one queue:
//! - Producers enqueue and signal, on any thread, without locks
//! - One consumer thread drains, sorts by capture time and renders
//! - Under sustained overload the queue sheds records instead of growing
//!
//! The service is an ordinary value. Create it at process start, pass the
//! handle (or an `Arc` of it) to whoever logs, and stop it on the way out:
//!
//! ```ignore
//! let logger = flog::init(&LoggerConfig::default(), ConsoleSink::stderr(true))?;
//! flog_info!(logger, "started with {} producers", n);
//! drop(logger); // joins the consumer and drains what is left
//! ```

pub mod backpressure;
pub mod bridge;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod queue;
pub mod service;
pub mod sink;
pub mod wake;

use std::sync::Arc;

pub use backpressure::{Admission, Backpressure, BackpressureSnapshot};
pub use bridge::{install_log_bridge, LogBridge};
pub use config::LoggerConfig;
pub use console::ConsoleSink;
pub use error::LogError;
pub use logging::{thread_id, LogRecord, Severity};
pub use queue::ConcurrentQueue;
pub use service::{AsyncLogService, LoggerGuard, ServiceStats};
pub use sink::Sink;
pub use wake::WakeEvent;

/// Create and start a service, returning the guard that shuts it down.
pub fn init(config: &LoggerConfig, sink: impl Sink + 'static) -> error::Result<LoggerGuard> {
    let service = Arc::new(AsyncLogService::new(config, sink)?);
    service.start()?;
    Ok(service.guard())
}
