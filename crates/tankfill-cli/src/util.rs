//! Utility functions for CLI operations.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, OffsetDateTime};

use tankfill_store::Store;

/// Parse a `--since`/`--until` value into milliseconds since the epoch.
///
/// Accepts RFC 3339 or `YYYY-MM-DD`. A bare date means the start of that day
/// (UTC), or its last millisecond when `end_of_day` is set.
pub fn parse_time_arg(value: &str, end_of_day: bool) -> Result<i64> {
    if let Ok(t) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(unix_ms(t));
    }
    let format = time::format_description::parse("[year]-[month]-[day]")
        .context("Invalid date format description")?;
    match Date::parse(value, &format) {
        Ok(date) => {
            let start = date.midnight().assume_utc();
            if end_of_day {
                Ok(unix_ms(start + Duration::days(1)) - 1)
            } else {
                Ok(unix_ms(start))
            }
        }
        Err(_) => bail!(
            "Invalid date/time '{}'. Use RFC3339 (2025-01-31T12:00:00Z) or YYYY-MM-DD",
            value
        ),
    }
}

fn unix_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Milliseconds since the epoch, now.
pub fn now_ms() -> i64 {
    unix_ms(OffsetDateTime::now_utc())
}

/// Open the history database for commands that need persistence.
pub fn open_store(path: &Path) -> Result<Store> {
    Store::open(path).with_context(|| format!("Failed to open history at {}", path.display()))
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Line-oriented output for streaming commands.
///
/// Appends to the file when one is given, so a stream can be resumed.
pub enum OutputSink {
    Stdout,
    File(File),
}

impl OutputSink {
    pub fn open(output: Option<&PathBuf>) -> Result<Self> {
        match output {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Ok(Self::File(file))
            }
            None => Ok(Self::Stdout),
        }
    }

    /// Whether the sink already holds data (used to skip CSV headers).
    pub fn is_nonempty(&self) -> bool {
        match self {
            Self::Stdout => false,
            Self::File(file) => file.metadata().map(|m| m.len() > 0).unwrap_or(false),
        }
    }

    pub fn write(&mut self, content: &str) -> Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(content.as_bytes())?;
                stdout.flush()?;
            }
            Self::File(file) => {
                file.write_all(content.as_bytes())?;
                file.flush()?;
            }
        }
        Ok(())
    }
}
