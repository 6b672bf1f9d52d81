//! Console log output.
//!
//! Renders one record per line to any `Write` target, stderr by default:
//!
//! ```text
//! [14:03:27.123456][INFO ][1] tuned to 7030000 Hz
//! [14:03:27.123502][ERROR][3] device lost
//! <trace lines>
//! ```
//!
//! Records carry a monotonic `Instant`. The sink maps it to local wall-clock
//! time through a (steady, system) base pair captured at construction, so
//! output times never jump with NTP adjustments during a run.

use std::io::{self, Write};
use std::time::Instant;

use chrono::{DateTime, Local, TimeDelta};

use crate::logging::{LogRecord, Severity};
use crate::sink::Sink;

const RESET: &str = "\x1B[0m";
const GRAY: &str = "\x1B[90m";

fn color_of(severity: Severity) -> &'static str {
    match severity {
        Severity::Debug => "\x1B[36m",
        Severity::Info => "\x1B[32m",
        Severity::Warn => "\x1B[33m",
        Severity::Error => "\x1B[31m",
    }
}

/// Maps monotonic instants into the local wall-clock domain.
#[derive(Clone, Copy, Debug)]
pub struct ClockBase {
    steady: Instant,
    system: DateTime<Local>,
}

impl ClockBase {
    /// Capture the reference pair now.
    pub fn now() -> Self {
        Self {
            steady: Instant::now(),
            system: Local::now(),
        }
    }

    /// Build from an explicit pair (tests, replay).
    pub fn from_parts(steady: Instant, system: DateTime<Local>) -> Self {
        Self { steady, system }
    }

    /// Wall-clock time corresponding to `instant`.
    pub fn to_local(&self, instant: Instant) -> DateTime<Local> {
        let offset = match instant.checked_duration_since(self.steady) {
            Some(after) => TimeDelta::from_std(after).unwrap_or(TimeDelta::MAX),
            None => -TimeDelta::from_std(self.steady - instant).unwrap_or(TimeDelta::MAX),
        };
        self.system
            .checked_add_signed(offset)
            .unwrap_or(self.system)
    }
}

/// Format a record as one output line (plus trace lines), newline included.
///
/// Format: `[HH:MM:SS.uuuuuu][LEVEL][tid] message\n`
pub fn format_record(record: &LogRecord, clock: &ClockBase, color: bool) -> String {
    let time = clock.to_local(record.timestamp()).format("%H:%M:%S%.6f");
    let level = record.severity().as_str();

    let mut message = record.message().to_string();
    if let Some(trace) = record.trace() {
        message.push('\n');
        message.push_str(trace);
    }

    if !color {
        return format!("[{time}][{level}][{:x}] {message}\n", record.producer_id());
    }

    if record.severity() == Severity::Debug {
        message = format!("{GRAY}{message}{RESET}");
    }
    format!(
        "{RESET}[{time}][{}{level}{RESET}][{:x}] {message}\n",
        color_of(record.severity()),
        record.producer_id()
    )
}

/// Sink writing formatted lines to a byte stream.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
    clock: ClockBase,
    color: bool,
}

impl ConsoleSink<io::Stderr> {
    /// Console sink on stderr.
    pub fn stderr(color: bool) -> Self {
        Self::new(io::stderr(), color)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            clock: ClockBase::now(),
            color,
        }
    }

    /// Use a specific clock base instead of "now".
    pub fn with_clock(mut self, clock: ClockBase) -> Self {
        self.clock = clock;
        self
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Sink for ConsoleSink<W> {
    fn render(&mut self, record: &LogRecord) -> io::Result<()> {
        let line = format_record(record, &self.clock, self.color);
        self.out.write_all(line.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
