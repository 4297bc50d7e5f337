//! Output formatting utilities for text, JSON, and CSV output.

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use tankfill_store::HistoryStats;
use tankfill_types::Reading;

/// Width of the fill gauge in characters.
pub const GAUGE_WIDTH: usize = 20;

/// Below this the level is shown as low.
const LOW_PERCENT: f64 = 20.0;
/// Below this the level is shown as medium.
const MEDIUM_PERCENT: f64 = 50.0;

/// Spinner redraw interval.
const SPINNER_TICK_MS: u64 = 80;

/// Spinner shown while scanning for and connecting to a sensor.
pub fn connecting_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Looking for a sensor named '{}*'...", prefix));
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            no_header: false,
        }
    }

    /// Create with no_header option for CSV output.
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }
}

/// Horizontal fill gauge, e.g. `██████████░░░░░░░░░░` for 50%.
pub fn gauge_bar(percent: f64, width: usize) -> String {
    let fraction = if percent.is_finite() {
        (percent / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (fraction * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn colored_gauge(percent: f64, no_color: bool) -> String {
    let bar = gauge_bar(percent, GAUGE_WIDTH);
    if no_color {
        bar
    } else if percent < LOW_PERCENT {
        format!("{}", bar.red())
    } else if percent < MEDIUM_PERCENT {
        format!("{}", bar.yellow())
    } else {
        format!("{}", bar.green())
    }
}

/// Human-readable UTC time of a millisecond timestamp.
pub fn format_timestamp(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts) * 1_000_000)
        .ok()
        .and_then(|t| {
            let format = time::format_description::parse(
                "[year]-[month]-[day] [hour]:[minute]:[second]",
            )
            .ok()?;
            t.format(&format).ok()
        })
        .unwrap_or_else(|| ts.to_string())
}

fn rfc3339(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

/// One reading as a text line.
pub fn format_reading_text(reading: &Reading, opts: &FormatOptions) -> String {
    let percent = format!("{:5.1}%", reading.percent);
    let percent = if opts.no_color {
        percent
    } else {
        format!("{}", percent.bold())
    };
    format!(
        "{}  {:>6.0} mm  {}  {}\n",
        format_timestamp(reading.timestamp),
        reading.distance_mm,
        colored_gauge(reading.percent, opts.no_color),
        percent
    )
}

/// One reading as a single JSON line.
pub fn format_reading_json(reading: &Reading) -> Result<String> {
    Ok(serde_json::to_string(reading)? + "\n")
}

/// CSV header matching [`format_reading_csv`].
pub fn csv_header() -> &'static str {
    "timestamp,time,distance_mm,percent\n"
}

/// One reading as a CSV row.
pub fn format_reading_csv(reading: &Reading) -> String {
    format!(
        "{},{},{},{}\n",
        reading.timestamp,
        rfc3339(reading.timestamp),
        reading.distance_mm,
        reading.percent
    )
}

/// A block of readings in the chosen format.
pub fn format_readings(
    readings: &[Reading],
    format: crate::cli::OutputFormat,
    opts: &FormatOptions,
) -> Result<String> {
    use crate::cli::OutputFormat;

    let mut out = String::new();
    match format {
        OutputFormat::Text => {
            for reading in readings {
                out.push_str(&format_reading_text(reading, opts));
            }
        }
        OutputFormat::Json => {
            out = serde_json::to_string_pretty(readings)? + "\n";
        }
        OutputFormat::Csv => {
            if !opts.no_header {
                out.push_str(csv_header());
            }
            for reading in readings {
                out.push_str(&format_reading_csv(reading));
            }
        }
    }
    Ok(out)
}

/// History summary as text.
pub fn format_stats_text(stats: &HistoryStats) -> String {
    let mut out = format!("Readings: {}\n", stats.count);
    if let (Some(oldest), Some(newest)) = (stats.oldest_ts, stats.newest_ts) {
        out.push_str(&format!(
            "Span:     {} .. {}\n",
            format_timestamp(oldest),
            format_timestamp(newest)
        ));
    }
    if let (Some(min), Some(max), Some(avg)) =
        (stats.min_percent, stats.max_percent, stats.avg_percent)
    {
        out.push_str(&format!(
            "Level:    min {:.1}%  max {:.1}%  avg {:.1}%\n",
            min, max, avg
        ));
    }
    out
}
