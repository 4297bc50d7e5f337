//! Demo command implementation.
//!
//! Runs the synthetic source through the same bus and history as live data,
//! so the rest of the tooling can be tried without a sensor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use tankfill_core::{ReadingBus, SyntheticOptions, SyntheticSource, SystemClock, listener};
use tankfill_types::Reading;

use super::ReadingPrinter;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::FormatOptions;
use crate::util::OutputSink;

/// Arguments for the demo command.
pub struct DemoArgs<'a> {
    pub count: u32,
    pub interval: Option<u64>,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub opts: FormatOptions,
    pub config: &'a Config,
    pub db: PathBuf,
    pub quiet: bool,
}

pub async fn cmd_demo(args: DemoArgs<'_>) -> Result<()> {
    let DemoArgs {
        count,
        interval,
        format,
        output,
        opts,
        config,
        db,
        quiet,
    } = args;

    let history = tankfill_store::open_history(&db);
    let source = SyntheticSource::new(
        config.tank.geometry(),
        Duration::from_millis(config.sensor.debounce_ms),
        history,
        Arc::new(SystemClock),
    )
    .context("Invalid tank geometry")?;

    let bus = ReadingBus::new();
    let (tx, mut readings) = mpsc::unbounded_channel::<Reading>();
    let forward = listener(move |reading| {
        let _ = tx.send(*reading);
    });
    bus.subscribe(&forward);

    let options = SyntheticOptions {
        interval: Duration::from_millis(interval.unwrap_or(config.demo.interval_ms)),
    };
    if !quiet {
        eprintln!(
            "Generating synthetic readings every {}ms. Press Ctrl-C to stop.",
            source.tick_interval(options).as_millis()
        );
    }
    let publisher = bus.clone();
    source.start(
        listener(move |reading| {
            publisher.publish(reading);
        }),
        options,
    );

    let mut printer = ReadingPrinter::new(OutputSink::open(output)?, format, opts);
    let mut taken: u32 = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(reading) = readings.recv() => {
                printer.print(&reading)?;
                taken += 1;
                if count > 0 && taken >= count {
                    break;
                }
            }
        }
    }

    source.stop();
    if !quiet {
        eprintln!("Generated {} readings.", taken);
    }
    Ok(())
}
