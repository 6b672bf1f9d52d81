//! Final destination of log records.

use std::io;

use crate::logging::LogRecord;

/// Renders records to their destination (console, file, test buffer).
///
/// The service calls a sink from one thread at a time, in timestamp order
/// within each batch. A sink may fail or even panic; the service reports
/// the failure as an internal error record and carries on.
pub trait Sink: Send {
    /// Render one record.
    fn render(&mut self, record: &LogRecord) -> io::Result<()>;

    /// Flush buffered output. Called after each batch.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> Sink for F
where
    F: FnMut(&LogRecord) -> io::Result<()> + Send,
{
    fn render(&mut self, record: &LogRecord) -> io::Result<()> {
        self(record)
    }
}
