//! Line-delimited inventory files: load, atomic save, validate and repair.
//!
//! Writes go through a temp file in the target directory followed by a rename,
//! so a reader never observes a half-written inventory.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::batch::BatchReport;
use crate::error::{LineError, Result, TrackerError};
use crate::inventory::backup::{Backup, BackupManager};
use crate::inventory::codec::{decode_all, encode_record};
use crate::inventory::{FunctionRecord, Inventory};

/// File extension of inventory files.
pub const INVENTORY_EXTENSION: &str = "jsonl";

/// Result of loading an inventory with the skip-and-count policy.
#[derive(Debug, Clone, Default)]
pub struct LoadedInventory {
    pub inventory: Inventory,
    /// Lines that failed to parse or validate
    pub skipped: Vec<LineError>,
    /// Well-formed lines whose identity key repeated an earlier line
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Some, but not all, lines are malformed
    pub recoverable: bool,
    pub records: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub recovered: usize,
    pub lost: usize,
    pub repaired_path: PathBuf,
}

/// Durable storage for inventories plus the backup bundles taken before updates.
pub struct InventoryStore {
    backups: BackupManager,
}

impl InventoryStore {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups: BackupManager::new(backup_dir),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        self.backups.dir()
    }

    /// Loads every parseable record. Malformed lines are skipped and counted.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedInventory> {
        let path = path.as_ref();
        let content = read_inventory_file(path)?;
        let (records, skipped) = decode_all(&content);

        for err in &skipped {
            tracing::warn!("Skipping {} in {}", err, path.display());
        }

        let total = records.len();
        let inventory = Inventory::from_records(records);
        let duplicates = total - inventory.len();
        if duplicates > 0 {
            tracing::warn!(
                "{} duplicate identity keys in {}; later lines win",
                duplicates,
                path.display()
            );
        }

        tracing::debug!("Loaded {} records from {}", inventory.len(), path.display());

        Ok(LoadedInventory {
            inventory,
            skipped,
            duplicates,
        })
    }

    /// Loads an inventory, treating a missing file as empty.
    pub fn load_or_empty(&self, path: impl AsRef<Path>) -> Result<LoadedInventory> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No inventory at {}, starting empty", path.display());
            return Ok(LoadedInventory::default());
        }
        self.load(path)
    }

    /// Writes the inventory atomically (temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>, inventory: &Inventory) -> Result<()> {
        write_records_atomic(path.as_ref(), inventory.iter())?;
        tracing::debug!(
            "Saved {} records to {}",
            inventory.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn validate(&self, path: impl AsRef<Path>) -> Result<ValidationReport> {
        let content = read_inventory_file(path.as_ref())?;
        let (records, errors) = decode_all(&content);

        Ok(ValidationReport {
            valid: errors.is_empty(),
            error: errors.first().map(|e| e.to_string()),
            recoverable: !errors.is_empty() && !records.is_empty(),
            records: records.len(),
            malformed: errors.len(),
        })
    }

    /// Validates every inventory file directly inside `dir`.
    pub fn validate_dir(&self, dir: impl AsRef<Path>) -> Result<BatchReport> {
        let mut report = BatchReport::new();

        for path in inventory_files(dir.as_ref())? {
            match self.validate(&path) {
                Ok(v) if v.valid => report.record_success(&path),
                Ok(v) => report.record_failure(
                    &path,
                    v.error.unwrap_or_else(|| "invalid inventory".to_string()),
                ),
                Err(e) => report.record_failure(&path, e),
            }
        }

        tracing::info!("Validated {}: {}", dir.as_ref().display(), report.summary());
        Ok(report)
    }

    /// Writes the well-formed records to a sibling file; the original is untouched.
    pub fn repair(&self, path: impl AsRef<Path>) -> Result<RepairReport> {
        let path = path.as_ref();
        let content = read_inventory_file(path)?;
        let (records, errors) = decode_all(&content);

        let repaired_path = repaired_path_for(path);
        write_records_atomic(&repaired_path, records.iter())?;

        tracing::info!(
            "Repaired {}: recovered {}, lost {} -> {}",
            path.display(),
            records.len(),
            errors.len(),
            repaired_path.display()
        );

        Ok(RepairReport {
            recovered: records.len(),
            lost: errors.len(),
            repaired_path,
        })
    }

    pub fn backup(&self, paths: &[PathBuf]) -> Result<Backup> {
        self.backups.create(paths)
    }

    pub fn list_backups(&self) -> Result<Vec<Backup>> {
        self.backups.list()
    }

    /// Copies bundle contents back over the original files, unconditionally.
    pub fn restore(&self, backup_id: &str) -> Result<Backup> {
        self.backups.restore(backup_id)
    }
}

fn read_inventory_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            TrackerError::NotFound(format!("inventory {}", path.display()))
        }
        _ => TrackerError::Io(e),
    })
}

fn write_records_atomic<'a>(
    path: &Path,
    records: impl Iterator<Item = &'a FunctionRecord>,
) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let tmp = NamedTempFile::new_in(&parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        for record in records {
            writer.write_all(encode_record(record)?.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TrackerError::Io(e.error))?;
    Ok(())
}

/// `functions.jsonl` -> `functions.repaired.jsonl`
fn repaired_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "inventory".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{}.repaired.{}", stem, ext.to_string_lossy()),
        None => format!("{}.repaired", stem),
    };
    path.with_file_name(name)
}

/// Inventory files directly inside `dir`, sorted by path.
pub fn inventory_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(TrackerError::NotFound(format!("directory {}", dir.display())));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext == INVENTORY_EXTENSION)
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
