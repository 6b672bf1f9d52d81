//! `log` crate facade backed by the async service.
//!
//! Lets `log::info!` and friends, from this crate's users and from their
//! dependencies, flow into the same queue as direct `submit` calls.

use std::sync::Arc;

use log::{LevelFilter, Metadata, Record};

use crate::error::Result;
use crate::logging::Severity;
use crate::service::AsyncLogService;

/// Adapter implementing [`log::Log`].
pub struct LogBridge {
    service: Arc<AsyncLogService>,
    level: LevelFilter,
}

impl LogBridge {
    pub fn new(service: Arc<AsyncLogService>, level: LevelFilter) -> Self {
        Self { service, level }
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = record.target();
        let args = record.args();
        self.service
            .submit_with(Severity::from(record.level()), || format!("[{target}] {args}"));
    }

    fn flush(&self) {
        self.service.flush();
    }
}

/// Register the service as the global `log` backend.
///
/// Can succeed only once per process.
pub fn install_log_bridge(service: Arc<AsyncLogService>, level: LevelFilter) -> Result<()> {
    log::set_boxed_logger(Box::new(LogBridge::new(service, level)))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggerConfig;
    use crate::logging::LogRecord;
    use log::{Level, Log};
    use parking_lot::Mutex;
    use std::io;

    #[test]
    fn test_bridge_forwards_enabled_levels() {
        let out = Arc::new(Mutex::new(Vec::<LogRecord>::new()));
        let sink_out = Arc::clone(&out);
        let sink = move |record: &LogRecord| -> io::Result<()> {
            sink_out.lock().push(record.clone());
            Ok(())
        };
        let service = Arc::new(AsyncLogService::new(&LoggerConfig::default(), sink).unwrap());
        let bridge = LogBridge::new(Arc::clone(&service), LevelFilter::Info);

        bridge.log(
            &Record::builder()
                .args(format_args!("rate {}", 48_000))
                .level(Level::Warn)
                .target("audio")
                .build(),
        );
        bridge.log(
            &Record::builder()
                .args(format_args!("too chatty"))
                .level(Level::Trace)
                .target("audio")
                .build(),
        );

        let records = out.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity(), Severity::Warn);
        assert_eq!(records[0].message(), "[audio] rate 48000");
    }
}
