//! Per-invocation context: project root plus its configuration.

use std::path::{Path, PathBuf};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::git::GitRevisionProvider;
use crate::history::SqliteHistory;
use crate::inventory::InventoryStore;

/// Resolves configured paths against one project root and opens the stores.
#[derive(Debug, Clone)]
pub struct TrackerContext {
    root: PathBuf,
    config: TrackerConfig,
}

impl TrackerContext {
    pub fn new(root: impl Into<PathBuf>, config: TrackerConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Loads `.func-tracker.yml` from `root`.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = TrackerConfig::load(&root)?;
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Joins relative paths onto the root; absolute paths pass through.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.resolve(&self.config.inventory.path)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(&self.config.inventory.backup_dir)
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.resolve(&self.config.history.db_path)
    }

    pub fn error_factor(&self) -> f64 {
        self.config.violations.severity_error_factor
    }

    pub fn open_store(&self) -> InventoryStore {
        InventoryStore::new(self.backup_dir())
    }

    pub fn open_history(&self) -> Result<SqliteHistory> {
        SqliteHistory::new(self.history_db_path())
    }

    /// Git provider rooted at the project, reading the inventory at the
    /// configured path.
    pub fn revision_provider(&self) -> Result<GitRevisionProvider> {
        let inventory = self.inventory_path();
        let relative = inventory.strip_prefix(&self.root).unwrap_or(&inventory);
        GitRevisionProvider::new(&self.root, relative.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MetricsHistory;
    use tempfile::TempDir;

    #[test]
    fn test_paths_resolve_against_root() {
        let dir = TempDir::new().unwrap();
        let ctx = TrackerContext::new(dir.path(), TrackerConfig::default());

        assert_eq!(
            ctx.inventory_path(),
            dir.path().join(".func-tracker/functions.jsonl")
        );
        assert_eq!(ctx.backup_dir(), dir.path().join(".func-tracker/backups"));

        let absolute = dir.path().join("elsewhere.db");
        assert_eq!(ctx.resolve(&absolute), absolute);
    }

    #[test]
    fn test_contexts_are_isolated() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let a = TrackerContext::load(first.path()).unwrap();
        let b = TrackerContext::load(second.path()).unwrap();

        let history = a.open_history().unwrap();
        assert!(a.history_db_path().exists());
        assert!(!b.history_db_path().exists());
        assert_eq!(history.stats().unwrap().total_snapshots, 0);
    }
}
