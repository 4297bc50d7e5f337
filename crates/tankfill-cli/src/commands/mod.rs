//! Command implementations for the CLI.

mod config;
mod demo;
mod doctor;
mod export;
mod history;
mod latest;
mod prune;
mod seed;
mod watch;

pub use config::cmd_config;
pub use demo::{DemoArgs, cmd_demo};
pub use doctor::cmd_doctor;
pub use export::cmd_export;
pub use history::{HistoryArgs, cmd_history};
pub use latest::cmd_latest;
pub use prune::cmd_prune;
pub use seed::cmd_seed;
pub use watch::{WatchArgs, cmd_watch};

use anyhow::Result;
use tankfill_types::Reading;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, csv_header, format_reading_csv, format_reading_json, format_reading_text};
use crate::util::OutputSink;

/// Streams readings to a sink one line at a time.
pub(crate) struct ReadingPrinter {
    sink: OutputSink,
    format: OutputFormat,
    opts: FormatOptions,
    header_written: bool,
}

impl ReadingPrinter {
    pub(crate) fn new(sink: OutputSink, format: OutputFormat, opts: FormatOptions) -> Self {
        let header_written = opts.no_header || sink.is_nonempty();
        Self {
            sink,
            format,
            opts,
            header_written,
        }
    }

    pub(crate) fn print(&mut self, reading: &Reading) -> Result<()> {
        let line = match self.format {
            OutputFormat::Text => format_reading_text(reading, &self.opts),
            OutputFormat::Json => format_reading_json(reading)?,
            OutputFormat::Csv => {
                let mut line = String::new();
                if !self.header_written {
                    line.push_str(csv_header());
                    self.header_written = true;
                }
                line.push_str(&format_reading_csv(reading));
                line
            }
        };
        self.sink.write(&line)
    }
}
