//! Brings a persisted inventory up to date against a fresh scan.

pub mod scanner;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::batch::BatchReport;
use crate::error::Result;
use crate::inventory::{Backup, FunctionRecord, IdentityKey, Inventory, InventoryStore};

pub use scanner::{JsonlScanner, PathFilter, ScanError, ScanOutcome, SourceScanner};

/// Identity keys grouped by classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<IdentityKey>,
    pub updated: Vec<IdentityKey>,
    pub unchanged: Vec<IdentityKey>,
    pub removed: Vec<IdentityKey>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "+{} ~{} -{} ={}",
            self.added.len(),
            self.updated.len(),
            self.removed.len(),
            self.unchanged.len()
        )
    }
}

/// Merged inventory plus the classification that produced it.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub merged: Inventory,
    pub changes: ChangeSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub execution_time_ms: u64,
    /// Non-fatal per-file scan errors
    #[serde(default)]
    pub errors: Vec<ScanError>,
    /// Malformed lines skipped while loading the persisted inventory
    #[serde(default)]
    pub skipped_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<Backup>,
    pub changes: ChangeSet,
}

impl ReconcileResult {
    fn from_changes(changes: ChangeSet, errors: Vec<ScanError>, started: Instant) -> Self {
        Self {
            added: changes.added.len(),
            updated: changes.updated.len(),
            deleted: changes.removed.len(),
            unchanged: changes.unchanged.len(),
            execution_time_ms: started.elapsed().as_millis() as u64,
            errors,
            skipped_lines: 0,
            backup: None,
            changes,
        }
    }
}

/// Classifies `new` against `old` and merges them.
///
/// Unchanged entries keep the old record verbatim; updated entries take the
/// new one; removed keys are dropped.
pub fn reconcile(old: &Inventory, new: &Inventory) -> Reconciliation {
    reconcile_with_failures(old, new, &HashSet::new())
}

/// Like [`reconcile`], but records from files the scanner failed on are left
/// exactly as persisted: neither removed nor refreshed.
pub fn reconcile_scan(old: &Inventory, scan: &ScanOutcome) -> Reconciliation {
    let new = Inventory::from_records(scan.records.iter().cloned());
    reconcile_with_failures(old, &new, &scan.failed_files())
}

fn reconcile_with_failures(
    old: &Inventory,
    new: &Inventory,
    failed_files: &HashSet<&str>,
) -> Reconciliation {
    let mut changes = ChangeSet::default();
    let mut merged: Vec<FunctionRecord> = Vec::with_capacity(new.len().max(old.len()));

    for record in new {
        if failed_files.contains(record.file.as_str()) {
            continue;
        }
        let key = record.key();
        match old.get(&key) {
            None => {
                changes.added.push(key);
                merged.push(record.clone());
            }
            Some(previous) if previous.content_hash != record.content_hash => {
                changes.updated.push(key);
                merged.push(record.clone());
            }
            Some(previous) => {
                changes.unchanged.push(key);
                merged.push(previous.clone());
            }
        }
    }

    for record in old {
        if failed_files.contains(record.file.as_str()) {
            changes.unchanged.push(record.key());
            merged.push(record.clone());
        } else if !new.contains_key(&record.key()) {
            changes.removed.push(record.key());
        }
    }

    Reconciliation {
        merged: Inventory::from_records(merged).sorted(),
        changes,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Take a backup of the inventory before overwriting it
    pub backup: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self { backup: true }
    }
}

/// Reconciles scans into inventory files through an [`InventoryStore`].
pub struct Reconciler<'a> {
    store: &'a InventoryStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a InventoryStore) -> Self {
        Self { store }
    }

    /// Reconciles `scan` into the inventory at `path` and writes the result back.
    pub fn update(
        &self,
        path: impl AsRef<Path>,
        scan: ScanOutcome,
        options: UpdateOptions,
    ) -> Result<ReconcileResult> {
        let path = path.as_ref();
        let started = Instant::now();

        let loaded = self.store.load_or_empty(path)?;
        let reconciliation = reconcile_scan(&loaded.inventory, &scan);

        for err in &scan.errors {
            tracing::warn!("Scan failed for {}: {}; keeping its records", err.file, err.message);
        }

        let backup = if options.backup && path.exists() {
            Some(self.store.backup(&[path.to_path_buf()])?)
        } else {
            None
        };

        self.store.save(path, &reconciliation.merged)?;

        let mut result = ReconcileResult::from_changes(reconciliation.changes, scan.errors, started);
        result.skipped_lines = loaded.skipped.len();
        result.backup = backup;

        tracing::info!(
            "Reconciled {}: {} added, {} updated, {} deleted, {} unchanged in {}ms",
            path.display(),
            result.added,
            result.updated,
            result.deleted,
            result.unchanged,
            result.execution_time_ms
        );
        Ok(result)
    }

    /// Runs the scanner, then [`Reconciler::update`].
    pub fn update_from_scanner(
        &self,
        path: impl AsRef<Path>,
        scanner: &dyn SourceScanner,
        root: &Path,
        include: &[String],
        exclude: &[String],
        options: UpdateOptions,
    ) -> Result<ReconcileResult> {
        let scan = scanner.scan(root, include, exclude)?;
        self.update(path, scan, options)
    }

    /// Updates several inventories, continuing past individual failures.
    pub fn update_batch(
        &self,
        items: impl IntoIterator<Item = (PathBuf, ScanOutcome)>,
        options: UpdateOptions,
    ) -> BatchReport {
        let mut report = BatchReport::new();

        for (path, scan) in items {
            match self.update(&path, scan, options) {
                Ok(_) => report.record_success(&path),
                Err(e) => {
                    tracing::warn!("Failed to update {}: {}", path.display(), e);
                    report.record_failure(&path, e);
                }
            }
        }

        tracing::info!("Batch update: {}", report.summary());
        report
    }
}

/// Dry-run classification without touching the filesystem.
pub fn preview(old: &Inventory, scan: &ScanOutcome) -> ReconcileResult {
    let started = Instant::now();
    let reconciliation = reconcile_scan(old, scan);
    ReconcileResult::from_changes(reconciliation.changes, scan.errors.clone(), started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{FunctionMetrics, Metric};
    use std::fs;
    use tempfile::TempDir;

    fn rec(file: &str, id: &str, start: u32, hash: &str) -> FunctionRecord {
        FunctionRecord::new(file, id, start, start + 4, hash)
    }

    #[test]
    fn test_reconcile_identical_is_idempotent() {
        let old = Inventory::from_records(vec![rec("a.ts", "foo", 1, "h1"), rec("b.ts", "bar", 3, "h2")]);

        let result = reconcile(&old, &old.clone());

        assert!(result.changes.is_empty());
        assert_eq!(result.changes.unchanged.len(), 2);
        assert_eq!(result.merged, old.sorted());
    }

    #[test]
    fn test_reconcile_classifies_all_kinds() {
        let old = Inventory::from_records(vec![
            rec("a.ts", "keep", 1, "h1"),
            rec("a.ts", "change", 10, "h2"),
            rec("a.ts", "gone", 20, "h3"),
        ]);
        let new = Inventory::from_records(vec![
            rec("a.ts", "keep", 1, "h1"),
            rec("a.ts", "change", 10, "h2b"),
            rec("a.ts", "fresh", 30, "h4"),
        ]);

        let result = reconcile(&old, &new);

        assert_eq!(result.changes.added, vec![rec("a.ts", "fresh", 30, "").key()]);
        assert_eq!(result.changes.updated, vec![rec("a.ts", "change", 10, "").key()]);
        assert_eq!(result.changes.removed, vec![rec("a.ts", "gone", 20, "").key()]);
        assert_eq!(result.merged.len(), 3);
        assert_eq!(
            result.merged.get(&rec("a.ts", "change", 10, "").key()).unwrap().content_hash,
            "h2b"
        );
    }

    #[test]
    fn test_unchanged_keeps_old_record_verbatim() {
        let old = Inventory::from_records(vec![rec("a.ts", "foo", 1, "h1").with_file_hash("f1")]);
        let new = Inventory::from_records(vec![FunctionRecord::new("a.ts", "foo", 1, 9, "h1")
            .with_file_hash("f2")]);

        let result = reconcile(&old, &new);

        assert!(result.changes.updated.is_empty());
        let kept = &result.merged.records()[0];
        assert_eq!(kept.file_hash, "f1");
        assert_eq!(kept.end_line, 5);
    }

    #[test]
    fn test_failed_file_records_are_retained() {
        let old = Inventory::from_records(vec![
            rec("broken.ts", "a", 1, "h1"),
            rec("ok.ts", "b", 1, "h2"),
        ]);
        let scan = ScanOutcome::new(vec![rec("broken.ts", "a", 1, "partial")])
            .with_error("broken.ts", "syntax error");

        let result = reconcile_scan(&old, &scan);

        assert!(result.changes.updated.is_empty());
        assert_eq!(result.changes.removed, vec![rec("ok.ts", "b", 1, "").key()]);
        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.merged.records()[0].content_hash, "h1");
    }

    #[test]
    fn test_update_persists_and_backs_up() {
        let dir = TempDir::new().unwrap();
        let store = InventoryStore::new(dir.path().join("backups"));
        let path = dir.path().join("functions.jsonl");
        let reconciler = Reconciler::new(&store);

        let first = reconciler
            .update(&path, ScanOutcome::new(vec![rec("a.ts", "foo", 1, "h1")]), UpdateOptions::default())
            .unwrap();
        assert_eq!(first.added, 1);
        assert!(first.backup.is_none());

        let metrics = FunctionMetrics::default().with(Metric::LinesOfCode, 12);
        let second = reconciler
            .update(
                &path,
                ScanOutcome::new(vec![rec("a.ts", "foo", 1, "h2").with_metrics(metrics)]),
                UpdateOptions::default(),
            )
            .unwrap();

        assert_eq!(second.updated, 1);
        let backup = second.backup.expect("backup taken before overwrite");
        assert_eq!(backup.file_names(), vec!["functions.jsonl"]);

        let stored = store.load(&path).unwrap().inventory;
        assert_eq!(stored.records()[0].content_hash, "h2");
    }

    #[test]
    fn test_update_batch_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        let store = InventoryStore::new(dir.path().join("backups"));
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let report = Reconciler::new(&store).update_batch(
            vec![
                (dir.path().join("one.jsonl"), ScanOutcome::new(vec![rec("a.ts", "x", 1, "h")])),
                (blocker.join("two.jsonl"), ScanOutcome::default()),
                (dir.path().join("three.jsonl"), ScanOutcome::default()),
            ],
            UpdateOptions { backup: false },
        );

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, blocker.join("two.jsonl"));
    }

    #[test]
    fn test_preview_does_not_write() {
        let old = Inventory::from_records(vec![rec("a.ts", "foo", 1, "h1")]);
        let result = preview(&old, &ScanOutcome::default());
        assert_eq!(result.deleted, 1);
        assert_eq!(result.added, 0);
    }
}
