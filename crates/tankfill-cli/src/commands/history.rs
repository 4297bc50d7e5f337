//! History command implementation.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_readings, format_stats_text};
use crate::util::{open_store, parse_time_arg, write_output};

/// Arguments for the history command.
pub struct HistoryArgs<'a> {
    pub limit: usize,
    pub since: Option<String>,
    pub until: Option<String>,
    pub stats: bool,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub opts: FormatOptions,
    pub db: &'a Path,
}

pub fn cmd_history(args: HistoryArgs<'_>) -> Result<()> {
    let HistoryArgs {
        limit,
        since,
        until,
        stats,
        format,
        output,
        opts,
        db,
    } = args;

    let store = open_store(db)?;

    if stats {
        let stats = store.stats()?;
        let content = match format {
            OutputFormat::Json => serde_json::to_string_pretty(&stats)? + "\n",
            _ => format_stats_text(&stats),
        };
        return write_output(output, &content);
    }

    let readings = if since.is_some() || until.is_some() {
        let start = since
            .as_deref()
            .map(|s| parse_time_arg(s, false))
            .transpose()?
            .unwrap_or(i64::MIN);
        let end = until
            .as_deref()
            .map(|s| parse_time_arg(s, true))
            .transpose()?
            .unwrap_or(i64::MAX);
        store.readings_between(start, end)?
    } else {
        store.recent_readings(limit)?
    };

    if readings.is_empty() && format == OutputFormat::Text {
        eprintln!("No readings stored in {}", db.display());
        return Ok(());
    }
    write_output(output, &format_readings(&readings, format, &opts)?)
}
