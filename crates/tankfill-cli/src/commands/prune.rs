//! Prune command implementation.

use std::path::Path;

use anyhow::{Result, bail};

use crate::config::Config;
use crate::util::{now_ms, open_store};

const DAY_MS: i64 = 86_400_000;

pub fn cmd_prune(days: Option<u32>, config: &Config, db: &Path, quiet: bool) -> Result<()> {
    let Some(days) = days.or(config.storage.retention_days) else {
        bail!("No retention given. Use --days <N> or set storage.retention_days in the config");
    };
    let cutoff = now_ms().saturating_sub(i64::from(days) * DAY_MS);
    let store = open_store(db)?;
    let removed = store.prune_before(cutoff)?;
    if !quiet {
        eprintln!(
            "Removed {} readings older than {} days ({} remain)",
            removed,
            days,
            store.count()?
        );
    }
    Ok(())
}
