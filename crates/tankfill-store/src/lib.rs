//! Local persistence for tank level readings.
//!
//! This crate provides a SQLite-backed
//! [`HistoryStore`](tankfill_core::HistoryStore) so readings survive
//! restarts and can be charted or exported offline.
//!
//! # Features
//!
//! - Append-only reading history indexed by timestamp
//! - A last-known-value slot, independent of the history
//! - Retention pruning and summary statistics
//! - CSV export
//! - Transparent fallback to an in-memory history when the database cannot
//!   be opened ([`open_history`])
//!
//! # Example
//!
//! ```no_run
//! use tankfill_store::Store;
//!
//! let store = Store::open_default()?;
//! for reading in store.recent_readings(10)? {
//!     println!("{}: {:.1}%", reading.timestamp, reading.percent);
//! }
//! # Ok::<(), tankfill_store::Error>(())
//! ```

mod error;
mod schema;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use tankfill_core::{MemoryHistory, SharedHistory};

pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
pub use store::{HistoryStats, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/tankfill/history.db`
/// - macOS: `~/Library/Application Support/tankfill/history.db`
/// - Windows: `C:\Users\<user>\AppData\Local\tankfill\history.db`
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tankfill")
        .join("history.db")
}

/// Open the history at `path`, falling back to memory.
///
/// When the database cannot be opened the failure is logged and an
/// in-memory history with the same query behaviour is returned instead, so
/// acquisition keeps working without persistence.
pub fn open_history(path: &Path) -> SharedHistory {
    match Store::open(path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                "Cannot open history at {} ({}); keeping readings in memory",
                path.display(),
                e
            );
            Arc::new(MemoryHistory::new())
        }
    }
}
