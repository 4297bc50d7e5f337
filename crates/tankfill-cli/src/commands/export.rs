//! Export command implementation.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::open_store;

pub fn cmd_export(output: Option<&PathBuf>, db: &Path, quiet: bool) -> Result<()> {
    let store = open_store(db)?;
    let rows = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            store.export_csv(BufWriter::new(file))?
        }
        None => store.export_csv(io::stdout().lock())?,
    };
    if !quiet {
        eprintln!("Exported {} readings", rows);
    }
    Ok(())
}
