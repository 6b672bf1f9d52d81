//! flog demo - hammer the async logger from several producer threads.
//!
//! 1. Build the service (console sink on stderr)
//! 2. Install the `log` facade bridge
//! 3. Spawn producers, each logging a burst of records
//! 4. Drop the guard: join the consumer, drain, print stats

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;

use flog::{flog_debug, flog_info, install_log_bridge, ConsoleSink, LoggerConfig, Severity};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Producer threads
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Records per producer thread
    #[arg(short, long, default_value_t = 1_000)]
    records: usize,

    /// JSON logger config file
    #[arg(short, long, env = "FLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Override the high watermark
    #[arg(long)]
    high_watermark: Option<usize>,

    /// Override the low watermark
    #[arg(long)]
    low_watermark: Option<usize>,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,

    /// Also emit debug records
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<LoggerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => LoggerConfig::default(),
    };

    if let Some(high) = cli.high_watermark {
        config.high_watermark = high;
    }
    if let Some(low) = cli.low_watermark {
        config.low_watermark = low;
    }
    if cli.no_color {
        config.color = false;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let logger = flog::init(&config, ConsoleSink::stderr(config.color))
        .context("starting logger")?;
    let service = Arc::clone(logger.service());

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    install_log_bridge(Arc::clone(&service), level).context("installing log bridge")?;

    log::info!(
        "{} producers x {} records, watermarks {}/{}",
        cli.threads,
        cli.records,
        config.high_watermark,
        config.low_watermark
    );

    let producers: Vec<_> = (0..cli.threads)
        .map(|worker| {
            let service = Arc::clone(&service);
            let records = cli.records;
            let verbose = cli.verbose;
            thread::Builder::new()
                .name(format!("producer-{worker}"))
                .spawn(move || {
                    for seq in 0..records {
                        if verbose {
                            flog_debug!(service, "worker {worker} tick {seq}");
                        }
                        flog_info!(service, "worker {worker} record {seq}");
                    }
                })
        })
        .collect::<std::io::Result<Vec<_>>>()
        .context("spawning producers")?;

    for producer in producers {
        if producer.join().is_err() {
            service.submit(Severity::Error, "producer thread panicked");
        }
    }

    // Stop first so the stats include the final drain.
    drop(logger);

    let stats = service.stats();
    println!(
        "dropped={} backpressure_events={} internal_errors={}",
        stats.backpressure.dropped, stats.backpressure.engaged, stats.internal_errors
    );
    Ok(())
}
