//! Command-line interface for BLE tank level sensors.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `watch` | Connect to the sensor and print live readings |
//! | `demo` | Generate synthetic readings without a sensor |
//! | `seed` | Backfill the history with synthetic readings |
//! | `history` | Show stored readings or summary statistics |
//! | `export` | Export the whole history as CSV |
//! | `latest` | Show the last known reading |
//! | `prune` | Delete old readings |
//! | `doctor` | Check Bluetooth support, configuration and storage |
//! | `config` | Show, locate or create the configuration file |
//! | `completions` | Generate shell completions |
//!
//! # Environment Variables
//!
//! - `TANKFILL_DEVICE_PREFIX`: sensor name prefix for `watch`
//! - `TANKFILL_DB`: history database path
//! - `TANKFILL_CONFIG`: configuration file path
//! - `NO_COLOR`: disable colored output
//! - `RUST_LOG`: log filter when neither `--verbose` nor `--quiet` is given

mod cli;
mod commands;
mod config;
mod format;
mod picker;
mod util;

use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{DemoArgs, HistoryArgs, WatchArgs};
use crate::config::Config;
use crate::format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions before tracing init
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "tankfill", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;
    let db = config.db_path(cli.db.as_deref());
    let output = cli.output.as_ref();
    let opts = FormatOptions::new(cli.no_color);

    match cli.command {
        Commands::Watch {
            device,
            output: out,
            count,
            timeout,
        } => {
            commands::cmd_watch(WatchArgs {
                device,
                count,
                timeout: Duration::from_secs(timeout),
                format: out.format,
                output,
                opts: opts.with_no_header(out.no_header),
                config: &config,
                db,
                quiet: cli.quiet,
            })
            .await
        }
        Commands::Demo {
            output: out,
            count,
            interval,
        } => {
            commands::cmd_demo(DemoArgs {
                count,
                interval,
                format: out.format,
                output,
                opts: opts.with_no_header(out.no_header),
                config: &config,
                db,
                quiet: cli.quiet,
            })
            .await
        }
        Commands::Seed { hours, per_hour } => {
            commands::cmd_seed(hours, per_hour, &config, &db, cli.quiet).await
        }
        Commands::History {
            output: out,
            limit,
            since,
            until,
            stats,
        } => commands::cmd_history(HistoryArgs {
            limit,
            since,
            until,
            stats,
            format: out.format,
            output,
            opts: opts.with_no_header(out.no_header),
            db: &db,
        }),
        Commands::Export => commands::cmd_export(output, &db, cli.quiet),
        Commands::Latest { output: out } => commands::cmd_latest(
            out.format,
            output,
            opts.with_no_header(out.no_header),
            &db,
        ),
        Commands::Prune { days } => commands::cmd_prune(days, &config, &db, cli.quiet),
        Commands::Doctor => {
            commands::cmd_doctor(&config, &config_path, &db, cli.verbose, cli.no_color).await
        }
        Commands::Config { action } => commands::cmd_config(action, &config, &config_path),
        Commands::Completions { .. } => Ok(()),
    }
}
