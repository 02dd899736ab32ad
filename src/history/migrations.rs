//! Versioned schema migrations for the metrics history database.
//!
//! Migrations are tracked in the `meta` table with key `schema_version`.
//! Each migration has a version number and runs exactly once.

use rusqlite::Connection;

use crate::error::{Result, TrackerError};

/// Current schema version. Increment when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

type MigrationFn = fn(&Connection) -> Result<()>;

/// All migrations in order. Index + 1 = version number.
const MIGRATIONS: &[MigrationFn] = &[migration_v1_base_schema, migration_v2_query_indexes];

/// Runs all pending migrations on the database.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(TrackerError::Schema(format!(
            "history schema version {} is newer than this binary ({})",
            current_version, CURRENT_SCHEMA_VERSION
        )));
    }

    for (idx, migration) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as u32;
        if version > current_version {
            migration(conn)?;
            set_schema_version(conn, version)?;
            tracing::debug!("Applied history migration v{}", version);
        }
    }

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;

    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .ok();

    match version {
        Some(v) => v
            .parse()
            .map_err(|_| TrackerError::Schema(format!("invalid schema_version '{}'", v))),
        None => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [version.to_string()],
    )?;
    Ok(())
}

fn migration_v1_base_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS metrics_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            function_id TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            parent_commit TEXT,
            branch_name TEXT NOT NULL,
            pr_number INTEGER,
            timestamp INTEGER NOT NULL,
            change_type TEXT NOT NULL,
            cyclomatic_complexity INTEGER NOT NULL,
            cognitive_complexity INTEGER NOT NULL,
            lines_of_code INTEGER NOT NULL,
            nesting_depth INTEGER NOT NULL,
            parameter_count INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_function ON metrics_snapshots(function_id);
        CREATE INDEX IF NOT EXISTS idx_snapshots_commit ON metrics_snapshots(commit_hash);
        "#,
    )?;
    Ok(())
}

fn migration_v2_query_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Composite index for per-function history ordered by time
        CREATE INDEX IF NOT EXISTS idx_snapshots_function_time
            ON metrics_snapshots(function_id, timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_snapshots_pr ON metrics_snapshots(pr_number);
        CREATE INDEX IF NOT EXISTS idx_snapshots_time ON metrics_snapshots(timestamp);
        "#,
    )?;
    Ok(())
}
