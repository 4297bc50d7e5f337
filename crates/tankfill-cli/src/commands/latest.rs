//! Latest command implementation.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_reading_json, format_readings};
use crate::util::{open_store, write_output};

pub fn cmd_latest(
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: FormatOptions,
    db: &Path,
) -> Result<()> {
    let store = open_store(db)?;
    let Some(reading) = store.latest()? else {
        if format == OutputFormat::Json {
            return write_output(output, "null\n");
        }
        eprintln!("No reading recorded yet");
        return Ok(());
    };
    let content = match format {
        OutputFormat::Json => format_reading_json(&reading)?,
        _ => format_readings(&[reading], format, &opts)?,
    };
    write_output(output, &content)
}
