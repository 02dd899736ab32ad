//! Backup bundles for inventory files.
//!
//! A bundle is a directory `<backup_dir>/<id>/` holding verbatim copies of the
//! inventory files plus a `manifest.json` describing them.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, TrackerError};
use crate::inventory::hash_bytes;

pub const MANIFEST_FILENAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// File name inside the bundle
    pub name: String,
    /// Where the file is restored to
    pub original_path: PathBuf,
    pub size_bytes: u64,
    /// xxh3 checksum of the copied bytes
    pub checksum: String,
}

/// Manifest of one backup bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub size_bytes: u64,
    pub files: Vec<BackupEntry>,
}

impl Backup {
    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }
}

pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn create(&self, paths: &[PathBuf]) -> Result<Backup> {
        if paths.is_empty() {
            return Err(TrackerError::NotFound("no files to back up".to_string()));
        }

        let created_at = now_millis();
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", created_at, &uuid[..8]);
        let bundle_dir = self.dir.join(&id);

        // Every source is read before the bundle directory exists
        let mut sources = Vec::with_capacity(paths.len());
        let mut used_names = HashSet::new();
        for path in paths {
            let bytes = fs::read(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    TrackerError::NotFound(format!("inventory {}", path.display()))
                }
                _ => TrackerError::Io(e),
            })?;
            let entry = BackupEntry {
                name: unique_name(path, &mut used_names),
                original_path: fs::canonicalize(path)?,
                size_bytes: bytes.len() as u64,
                checksum: hash_bytes(&bytes),
            };
            sources.push((entry, bytes));
        }

        fs::create_dir_all(&bundle_dir)?;
        let mut files = Vec::with_capacity(sources.len());
        for (entry, bytes) in sources {
            if let Err(e) = fs::write(bundle_dir.join(&entry.name), &bytes) {
                let _ = fs::remove_dir_all(&bundle_dir);
                return Err(e.into());
            }
            files.push(entry);
        }

        let backup = Backup {
            id,
            created_at,
            size_bytes: files.iter().map(|f| f.size_bytes).sum(),
            files,
        };

        let manifest = serde_json::to_vec_pretty(&backup)?;
        fs::write(bundle_dir.join(MANIFEST_FILENAME), manifest)?;

        tracing::info!(
            "Created backup {} ({} files, {} bytes)",
            backup.id,
            backup.files.len(),
            backup.size_bytes
        );
        Ok(backup)
    }

    /// All readable bundles, newest first.
    pub fn list(&self) -> Result<Vec<Backup>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match read_manifest(&entry.path()) {
                Ok(backup) => backups.push(backup),
                Err(e) => tracing::warn!(
                    "Ignoring unreadable backup {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(backups)
    }

    /// Verifies every bundle file, then copies them back over the originals.
    pub fn restore(&self, backup_id: &str) -> Result<Backup> {
        let bundle_dir = self.dir.join(backup_id);
        if backup_id.is_empty() || !bundle_dir.join(MANIFEST_FILENAME).is_file() {
            return Err(TrackerError::NotFound(format!("backup {}", backup_id)));
        }
        let backup = read_manifest(&bundle_dir)?;

        let mut contents = Vec::with_capacity(backup.files.len());
        for entry in &backup.files {
            let bytes = fs::read(bundle_dir.join(&entry.name))?;
            if hash_bytes(&bytes) != entry.checksum {
                return Err(TrackerError::Schema(format!(
                    "backup {} file {} does not match its checksum",
                    backup_id, entry.name
                )));
            }
            contents.push((entry, bytes));
        }

        for (entry, bytes) in contents {
            write_atomic(&entry.original_path, &bytes)?;
            tracing::debug!("Restored {}", entry.original_path.display());
        }

        tracing::info!("Restored backup {} ({} files)", backup.id, backup.files.len());
        Ok(backup)
    }
}

fn read_manifest(bundle_dir: &Path) -> Result<Backup> {
    let bytes = fs::read(bundle_dir.join(MANIFEST_FILENAME))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn unique_name(path: &Path, used: &mut HashSet<String>) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "inventory".to_string());

    let mut name = base.clone();
    let mut n = 1;
    while !used.insert(name.clone()) {
        name = format!("{}.{}", n, base);
        n += 1;
    }
    name
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TrackerError::Io(e.error))?;
    Ok(())
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
