//! Module: config
//!
//! Purpose: Tunables for the async log service and its console sink.
//!
//! Deserializable with serde so an application can embed a `[logging]`
//! section in its own config file; every field falls back to its default.

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};

/// Backpressure engages once this many records are queued.
pub const DEFAULT_HIGH_WATERMARK: usize = 1_000_000;

/// Backpressure clears once the queue drains to this many records.
pub const DEFAULT_LOW_WATERMARK: usize = 1_000;

/// Name given to the consumer thread.
pub const DEFAULT_THREAD_NAME: &str = "flog:logThread";

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub thread_name: String,
    /// ANSI colors on the console sink.
    pub color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            color: true,
        }
    }
}

impl LoggerConfig {
    /// Set both watermarks.
    pub fn with_watermarks(mut self, high: usize, low: usize) -> Self {
        self.high_watermark = high;
        self.low_watermark = low;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Check invariants. `high_watermark` must exceed `low_watermark`.
    pub fn validate(&self) -> Result<()> {
        if self.high_watermark <= self.low_watermark {
            return Err(LogError::InvalidWatermarks {
                high: self.high_watermark,
                low: self.low_watermark,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LoggerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.high_watermark, DEFAULT_HIGH_WATERMARK);
        assert_eq!(config.low_watermark, DEFAULT_LOW_WATERMARK);
    }

    #[test]
    fn test_rejects_inverted_watermarks() {
        let config = LoggerConfig::default().with_watermarks(10, 10);
        assert!(matches!(
            config.validate(),
            Err(LogError::InvalidWatermarks { high: 10, low: 10 })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LoggerConfig =
            serde_json::from_str(r#"{ "high_watermark": 64, "color": false }"#).unwrap();

        assert_eq!(config.high_watermark, 64);
        assert_eq!(config.low_watermark, DEFAULT_LOW_WATERMARK);
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
        assert!(!config.color);
    }
}
