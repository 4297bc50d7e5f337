//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Omit header row in CSV output (useful for appending)
    #[arg(long)]
    pub no_header: bool,
}

#[derive(Parser)]
#[command(name = "tankfill")]
#[command(author, version, about = "Water tank level monitor for BLE distance sensors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output (any NO_COLOR value except 0/false/no/off)
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "TANKFILL_CONFIG")]
    pub config: Option<PathBuf>,

    /// History database (overrides the configured path)
    #[arg(long, global = true, env = "TANKFILL_DB")]
    pub db: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the sensor and print live readings
    Watch {
        /// Advertised name prefix of the sensor
        #[arg(short, long, env = "TANKFILL_DEVICE_PREFIX")]
        device: Option<String>,

        #[command(flatten)]
        output: OutputArgs,

        /// Number of readings to take before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Connection timeout in seconds
        #[arg(short = 'T', long, default_value = "15")]
        timeout: u64,
    },

    /// Generate synthetic readings without a sensor
    Demo {
        #[command(flatten)]
        output: OutputArgs,

        /// Number of readings to generate before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Milliseconds between readings (defaults to the configured value)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Backfill the history with synthetic readings
    Seed {
        /// Hours of history to generate, ending now
        #[arg(long, default_value = "6")]
        hours: f64,

        /// Readings per hour
        #[arg(long, default_value = "12")]
        per_hour: u32,
    },

    /// Show stored readings
    History {
        #[command(flatten)]
        output: OutputArgs,

        /// Number of most recent readings to show
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Show readings since this date/time (RFC3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Show readings until this date/time (RFC3339 or YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        /// Show summary statistics instead of readings
        #[arg(long, conflicts_with_all = ["since", "until"])]
        stats: bool,
    },

    /// Export the whole history as CSV
    Export,

    /// Show the last known reading
    Latest {
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Delete old readings
    Prune {
        /// Keep this many days of history (defaults to the configured retention)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Check Bluetooth support, configuration and storage
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
