use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::history::migrations::run_migrations;
use crate::history::{
    analyze_function, ChangeType, HistoryStats, MetricsHistory, MetricsSnapshot, ViolationAnalysis,
};
use crate::quality::Thresholds;

const SNAPSHOT_COLUMNS: &str = "function_id, commit_hash, parent_commit, branch_name, pr_number, \
     timestamp, change_type, cyclomatic_complexity, cognitive_complexity, lines_of_code, \
     nesting_depth, parameter_count";

const NEWEST_FIRST: &str = "ORDER BY timestamp DESC, id DESC";

pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// WAL keeps readers unblocked while a collection run writes.
    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        Ok(())
    }

    fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<MetricsSnapshot> {
        let change_type: String = row.get(6)?;
        let change_type = ChangeType::from_str(&change_type).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                Type::Text,
                format!("unknown change_type '{}'", change_type).into(),
            )
        })?;

        Ok(MetricsSnapshot {
            function_id: row.get(0)?,
            commit_hash: row.get(1)?,
            parent_commit: row.get(2)?,
            branch_name: row.get(3)?,
            pr_number: row.get::<_, Option<i64>>(4)?.map(|n| n as u64),
            timestamp: row.get(5)?,
            change_type,
            cyclomatic_complexity: row.get(7)?,
            cognitive_complexity: row.get(8)?,
            lines_of_code: row.get(9)?,
            nesting_depth: row.get(10)?,
            parameter_count: row.get(11)?,
        })
    }

    fn query_snapshots(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<MetricsSnapshot>> {
        let sql = format!(
            "SELECT {} FROM metrics_snapshots {} {}",
            SNAPSHOT_COLUMNS, filter, NEWEST_FIRST
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map(params, Self::row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(snapshots)
    }
}

impl MetricsHistory for SqliteHistory {
    fn save(&self, snapshots: &[MetricsSnapshot]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO metrics_snapshots ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                SNAPSHOT_COLUMNS
            ))?;
            for s in snapshots {
                stmt.execute(params![
                    s.function_id,
                    s.commit_hash,
                    s.parent_commit,
                    s.branch_name,
                    s.pr_number.map(|n| n as i64),
                    s.timestamp,
                    s.change_type.as_str(),
                    s.cyclomatic_complexity,
                    s.cognitive_complexity,
                    s.lines_of_code,
                    s.nesting_depth,
                    s.parameter_count,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!("Saved {} snapshots", snapshots.len());
        Ok(snapshots.len())
    }

    fn history_of(&self, function_id: &str, limit: Option<usize>) -> Result<Vec<MetricsSnapshot>> {
        let mut snapshots = self.query_snapshots("WHERE function_id = ?1", params![function_id])?;
        if let Some(limit) = limit {
            snapshots.truncate(limit);
        }
        Ok(snapshots)
    }

    fn by_commit(&self, commit_hash: &str) -> Result<Vec<MetricsSnapshot>> {
        self.query_snapshots("WHERE commit_hash = ?1", params![commit_hash])
    }

    fn by_pr(&self, pr_number: u64) -> Result<Vec<MetricsSnapshot>> {
        self.query_snapshots("WHERE pr_number = ?1", params![pr_number as i64])
    }

    fn by_date_range(&self, from: i64, to: i64) -> Result<Vec<MetricsSnapshot>> {
        self.query_snapshots("WHERE timestamp >= ?1 AND timestamp <= ?2", params![from, to])
    }

    fn latest(&self, function_id: &str) -> Result<Option<MetricsSnapshot>> {
        let sql = format!(
            "SELECT {} FROM metrics_snapshots WHERE function_id = ?1 {} LIMIT 1",
            SNAPSHOT_COLUMNS, NEWEST_FIRST
        );
        let snapshot = self
            .conn
            .query_row(&sql, params![function_id], Self::row_to_snapshot)
            .optional()?;
        Ok(snapshot)
    }

    fn function_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT function_id FROM metrics_snapshots ORDER BY function_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn analyze_violations(
        &self,
        thresholds: &Thresholds,
        error_factor: f64,
    ) -> Result<Vec<ViolationAnalysis>> {
        // Rows arrive grouped by function, newest first; only the two most
        // recent snapshots and the count are needed per function.
        let sql = format!(
            "SELECT {} FROM metrics_snapshots ORDER BY function_id, timestamp DESC, id DESC",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_snapshot)?;

        let mut analyses = Vec::new();
        let mut recent: Vec<MetricsSnapshot> = Vec::with_capacity(2);
        let mut count = 0usize;

        for row in rows {
            let snapshot = row?;
            if recent
                .first()
                .map(|s| s.function_id != snapshot.function_id)
                .unwrap_or(false)
            {
                analyses.extend(analyze_function(&recent, count, thresholds, error_factor));
                recent.clear();
                count = 0;
            }
            count += 1;
            if recent.len() < 2 {
                recent.push(snapshot);
            }
        }
        analyses.extend(analyze_function(&recent, count, thresholds, error_factor));

        Ok(analyses)
    }

    fn prune_before(&self, cutoff: i64) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM metrics_snapshots WHERE timestamp < ?1", params![cutoff])?;
        Ok(removed)
    }

    fn stats(&self) -> Result<HistoryStats> {
        let stats = self.conn.query_row(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT function_id), COUNT(DISTINCT commit_hash),
                   MIN(timestamp), MAX(timestamp)
            FROM metrics_snapshots
            "#,
            [],
            |row| {
                Ok(HistoryStats {
                    total_snapshots: row.get::<_, i64>(0)? as usize,
                    functions: row.get::<_, i64>(1)? as usize,
                    commits: row.get::<_, i64>(2)? as usize,
                    oldest_timestamp: row.get(3)?,
                    newest_timestamp: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }
}
