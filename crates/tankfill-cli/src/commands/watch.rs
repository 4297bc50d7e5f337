//! Watch command implementation.
//!
//! Connects a [`SensorSession`] over BLE and prints every accepted reading
//! until Ctrl-C, the requested count, or loss of the link.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use tokio::sync::{broadcast, mpsc};

use tankfill_core::{
    BleConnector, ConnectionConfig, DisconnectReason, ReadingBus, SensorSession, SessionEvent,
    SystemClock, detect_capabilities, listener,
};
use tankfill_types::Reading;

use super::ReadingPrinter;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{FormatOptions, connecting_spinner};
use crate::picker::PromptPicker;
use crate::util::OutputSink;

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub device: Option<String>,
    pub count: u32,
    pub timeout: Duration,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub opts: FormatOptions,
    pub config: &'a Config,
    pub db: PathBuf,
    pub quiet: bool,
}

pub async fn cmd_watch(args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        device,
        count,
        timeout,
        format,
        output,
        opts,
        config,
        db,
        quiet,
    } = args;

    let mut session_config = config
        .session_config()
        .connection(ConnectionConfig::default().connection_timeout(timeout));
    if let Some(prefix) = device {
        session_config.device_name_prefix = prefix;
    }
    session_config
        .validate()
        .context("Invalid sensor configuration")?;

    let history = tankfill_store::open_history(&db);
    let bus = ReadingBus::new();
    let (tx, mut readings) = mpsc::unbounded_channel::<Reading>();
    let forward = listener(move |reading| {
        let _ = tx.send(*reading);
    });
    bus.subscribe(&forward);

    let prefix = session_config.device_name_prefix.clone();
    let spinner = (!quiet && io::stderr().is_terminal()).then(|| connecting_spinner(&prefix));
    let connector = BleConnector::new(session_config.connection.clone())
        .with_picker(Arc::new(PromptPicker::with_spinner(spinner.clone())));
    let capabilities = detect_capabilities().await;
    let session = SensorSession::new(
        session_config,
        Arc::new(connector),
        Arc::new(capabilities),
        history,
        bus,
        Arc::new(SystemClock),
    );
    let mut events = session.subscribe_events();

    if !quiet && spinner.is_none() {
        eprintln!("Looking for a sensor named '{}*'...", prefix);
    }
    let connected = tokio::select! {
        result = session.connect_default() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }
    match connected {
        Some(result) => result.context("Failed to connect to the sensor")?,
        None => {
            session.disconnect().await?;
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    let mut printer = ReadingPrinter::new(OutputSink::open(output)?, format, opts);
    let mut taken: u32 = 0;
    let mut link_lost = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !quiet {
                    eprintln!("\nShutting down...");
                }
                break;
            }
            Some(reading) = readings.recv() => {
                printer.print(&reading)?;
                taken += 1;
                if count > 0 && taken >= count {
                    if !quiet {
                        eprintln!("Completed {} readings.", taken);
                    }
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if report_event(&event, quiet, opts.no_color) {
                        link_lost = true;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.disconnect().await?;
    if link_lost {
        bail!("Connection to the sensor was lost after {} readings", taken);
    }
    Ok(())
}

/// Print a lifecycle event. Returns true when the link was lost.
fn report_event(event: &SessionEvent, quiet: bool, no_color: bool) -> bool {
    match event {
        SessionEvent::Connected { device } if !quiet => {
            if no_color {
                eprintln!("Connected to {}", device);
            } else {
                eprintln!("Connected to {}", device.cyan());
            }
        }
        SessionEvent::ConfigWarning { message } => {
            if no_color {
                eprintln!("[!!] {}", message);
            } else {
                eprintln!("{} {}", "[!!]".yellow(), message);
            }
            eprintln!("Connected, but no data will arrive. Press Ctrl-C to exit.");
        }
        SessionEvent::Disconnected {
            reason: DisconnectReason::LinkLost,
            ..
        } => return true,
        _ => {}
    }
    false
}
