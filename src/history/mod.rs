pub mod analysis;
pub mod migrations;
pub mod models;
pub mod sqlite;

use crate::error::Result;
use crate::inventory::Inventory;
use crate::quality::Thresholds;

pub use analysis::{analyze_function, classify_trend, ChangePolicy};
pub use models::*;
pub use sqlite::SqliteHistory;

const DAY_MILLIS: i64 = 86_400_000;

/// Append-only store of metrics snapshots.
///
/// All queries return snapshots most recent first (ties: most recently saved first).
pub trait MetricsHistory {
    /// Inserts snapshots without deduplication. Returns the number written.
    fn save(&self, snapshots: &[MetricsSnapshot]) -> Result<usize>;
    /// Snapshots of one function; `limit` truncates the result only.
    fn history_of(&self, function_id: &str, limit: Option<usize>) -> Result<Vec<MetricsSnapshot>>;
    fn by_commit(&self, commit_hash: &str) -> Result<Vec<MetricsSnapshot>>;
    fn by_pr(&self, pr_number: u64) -> Result<Vec<MetricsSnapshot>>;
    /// Inclusive range of epoch milliseconds.
    fn by_date_range(&self, from: i64, to: i64) -> Result<Vec<MetricsSnapshot>>;
    fn latest(&self, function_id: &str) -> Result<Option<MetricsSnapshot>>;
    fn function_ids(&self) -> Result<Vec<String>>;
    /// Latest snapshot per function, checked against thresholds.
    fn analyze_violations(
        &self,
        thresholds: &Thresholds,
        error_factor: f64,
    ) -> Result<Vec<ViolationAnalysis>>;
    /// Deletes snapshots older than `cutoff` (epoch ms). Returns rows removed.
    fn prune_before(&self, cutoff: i64) -> Result<usize>;
    fn stats(&self) -> Result<HistoryStats>;
}

/// Retention maintenance: drops snapshots older than `max_history_days`.
pub fn apply_retention(history: &dyn MetricsHistory, max_history_days: u32, now: i64) -> Result<usize> {
    let cutoff = now - i64::from(max_history_days) * DAY_MILLIS;
    let removed = history.prune_before(cutoff)?;
    tracing::info!(
        "Retention ({} days) removed {} snapshots",
        max_history_days,
        removed
    );
    Ok(removed)
}

/// Records one snapshot per record with complete metrics, tagged with `context`.
///
/// The change type of each snapshot is derived from the function's latest
/// stored snapshot using `policy`.
pub fn collect(
    history: &dyn MetricsHistory,
    inventory: &Inventory,
    context: &CommitContext,
    policy: &ChangePolicy,
) -> Result<CollectReport> {
    let mut report = CollectReport::default();
    let mut snapshots = Vec::with_capacity(inventory.len());

    for record in inventory {
        if !record.metrics.is_complete() {
            report.skipped_incomplete += 1;
            continue;
        }

        let previous = history.latest(&record.function_id())?;
        let change_type = policy.classify(previous.as_ref(), &record.metrics);
        let Some(snapshot) = MetricsSnapshot::from_record(record, context, change_type) else {
            report.skipped_incomplete += 1;
            continue;
        };

        match change_type {
            ChangeType::Created => report.created += 1,
            ChangeType::Modified => report.modified += 1,
            ChangeType::Refactored => report.refactored += 1,
        }
        snapshots.push(snapshot);
    }

    report.recorded = history.save(&snapshots)?;

    tracing::info!(
        "Collected {} snapshots for commit {} ({} skipped incomplete)",
        report.recorded,
        context.commit_hash,
        report.skipped_incomplete
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{FunctionMetrics, FunctionRecord, Metric};

    fn metrics(cyc: u32, loc: u32) -> FunctionMetrics {
        FunctionMetrics::default()
            .with(Metric::CyclomaticComplexity, cyc)
            .with(Metric::CognitiveComplexity, cyc)
            .with(Metric::LinesOfCode, loc)
            .with(Metric::NestingDepth, 1)
            .with(Metric::ParameterCount, 1)
    }

    #[test]
    fn test_collect_classifies_against_history() {
        let history = SqliteHistory::in_memory().unwrap();
        let policy = ChangePolicy::default();

        let first = Inventory::from_records(vec![
            FunctionRecord::new("a.ts", "foo", 1, 10, "h1").with_metrics(metrics(2, 10)),
            FunctionRecord::new("a.ts", "partial", 20, 30, "h2"),
        ]);
        let report = collect(&history, &first, &CommitContext::new("c1", "main", 1_000), &policy).unwrap();
        assert_eq!(report.recorded, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped_incomplete, 1);

        let second = Inventory::from_records(vec![
            FunctionRecord::new("a.ts", "foo", 4, 40, "h3").with_metrics(metrics(9, 40)),
        ]);
        let report = collect(&history, &second, &CommitContext::new("c2", "main", 2_000), &policy).unwrap();
        assert_eq!(report.refactored, 1);

        let series = history.history_of("a.ts::foo", None).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].commit_hash, "c2");
        assert_eq!(series[0].change_type, ChangeType::Refactored);
    }

    #[test]
    fn test_apply_retention() {
        let history = SqliteHistory::in_memory().unwrap();
        let record = FunctionRecord::new("a.ts", "foo", 1, 10, "h").with_metrics(metrics(1, 5));
        let old = MetricsSnapshot::from_record(&record, &CommitContext::new("old", "main", 0), ChangeType::Created).unwrap();
        let now = 40 * DAY_MILLIS;
        let recent = MetricsSnapshot::from_record(&record, &CommitContext::new("new", "main", now - DAY_MILLIS), ChangeType::Modified).unwrap();
        history.save(&[old, recent]).unwrap();

        let removed = apply_retention(&history, 30, now).unwrap();

        assert_eq!(removed, 1);
        let remaining = history.history_of("a.ts::foo", None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].commit_hash, "new");
    }
}
