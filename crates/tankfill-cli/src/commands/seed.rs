//! Seed command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use tankfill_core::{SeedOptions, SystemClock, seed_history};

use crate::config::Config;
use crate::util::open_store;

pub async fn cmd_seed(hours: f64, per_hour: u32, config: &Config, db: &Path, quiet: bool) -> Result<()> {
    let store = open_store(db)?;
    let options = SeedOptions {
        hours,
        samples_per_hour: per_hour,
    };
    let written = seed_history(&store, &config.tank.geometry(), &SystemClock, options)
        .await
        .context("Failed to seed history")?;
    if !quiet {
        eprintln!(
            "Seeded {} of {} readings into {}",
            written,
            options.total(),
            db.display()
        );
    }
    Ok(())
}
