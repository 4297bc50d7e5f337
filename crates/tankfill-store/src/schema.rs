//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    match schema_version(conn)? {
        0 => {
            create_schema_v1(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)?;
        }
        SCHEMA_VERSION => {}
        found if found > SCHEMA_VERSION => {
            return Err(Error::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        // No older versions have shipped yet.
        _ => set_schema_version(conn, SCHEMA_VERSION)?,
    }
    Ok(())
}

/// The stored schema version, 0 for a fresh database.
pub(crate) fn schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    let version = conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- Accepted readings, append-only apart from retention pruning
        CREATE TABLE IF NOT EXISTS readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts INTEGER NOT NULL,
            distance_mm REAL NOT NULL,
            percent REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_readings_ts ON readings(ts);

        -- Last-known-value slot
        CREATE TABLE IF NOT EXISTS latest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            ts INTEGER NOT NULL,
            distance_mm REAL NOT NULL,
            percent REAL NOT NULL
        );
        "#,
    )?;
    Ok(())
}
