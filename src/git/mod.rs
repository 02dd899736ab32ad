use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, TrackerError};
use crate::inventory::{decode_all, Inventory};

/// Source of commit metadata and of inventories at arbitrary refs.
pub trait RevisionProvider {
    fn current_commit(&self) -> Result<String>;
    fn current_branch(&self) -> Result<String>;
    /// `None` for a root commit.
    fn parent_commit(&self) -> Result<Option<String>>;
    fn changed_files(&self, base: &str) -> Result<Vec<ChangedFile>>;
    /// Inventory as committed at `reference`. An inventory absent at that
    /// ref resolves to an empty one.
    fn resolve_ref(&self, reference: &str) -> Result<Inventory>;
}

/// Information about a changed file
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: ChangeStatus,
}

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeStatus {
    pub fn from_git_status(status: &str) -> Option<Self> {
        match status.chars().next()? {
            'A' => Some(ChangeStatus::Added),
            'M' => Some(ChangeStatus::Modified),
            'D' => Some(ChangeStatus::Deleted),
            'R' => Some(ChangeStatus::Renamed),
            _ => Some(ChangeStatus::Modified),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
            ChangeStatus::Renamed => "renamed",
        }
    }
}

/// Revision provider backed by the `git` executable.
pub struct GitRevisionProvider {
    repo_path: PathBuf,
    /// Inventory path relative to `repo_path`, `/`-separated
    inventory_path: String,
}

impl GitRevisionProvider {
    pub fn new(repo_path: impl AsRef<Path>, inventory_path: impl Into<String>) -> Result<Self> {
        let repo_path = repo_path.as_ref().to_path_buf();
        let inventory_path: String = inventory_path.into();

        let output = Command::new("git")
            .args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(&repo_path)
            .output()
            .map_err(|e| TrackerError::Revision(format!("Failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(TrackerError::Revision(format!(
                "{} is not a git repository",
                repo_path.display()
            )));
        }

        Ok(Self {
            repo_path,
            inventory_path: inventory_path
                .replace('\\', "/")
                .trim_start_matches("./")
                .to_string(),
        })
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| TrackerError::Revision(format!("Failed to run git {}: {}", args.join(" "), e)))
    }

    /// Runs git and returns trimmed stdout, failing on a non-zero exit.
    fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            return Err(TrackerError::Revision(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn verify_ref(&self, reference: &str) -> Result<()> {
        let commitish = format!("{}^{{commit}}", reference);
        let output = self.git(&["rev-parse", "--verify", "--quiet", &commitish])?;
        if !output.status.success() {
            return Err(TrackerError::NotFound(format!("revision '{}'", reference)));
        }
        Ok(())
    }

    fn parse_diff_line(line: &str) -> Option<ChangedFile> {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() >= 2 {
            let status = ChangeStatus::from_git_status(parts[0])?;
            // Renames list old and new path; keep the new one
            let path = parts.last()?.to_string();
            Some(ChangedFile { path, status })
        } else {
            None
        }
    }
}

impl RevisionProvider for GitRevisionProvider {
    fn current_commit(&self) -> Result<String> {
        self.git_stdout(&["rev-parse", "HEAD"])
    }

    fn current_branch(&self) -> Result<String> {
        let branch = self.git_stdout(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        // Detached HEAD reports "HEAD"
        if branch == "HEAD" {
            return Ok("detached".to_string());
        }
        Ok(branch)
    }

    fn parent_commit(&self) -> Result<Option<String>> {
        let output = self.git(&["rev-parse", "--verify", "--quiet", "HEAD^"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let parent = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!parent.is_empty()).then_some(parent))
    }

    fn changed_files(&self, base: &str) -> Result<Vec<ChangedFile>> {
        self.verify_ref(base)?;
        let stdout = self.git_stdout(&["diff", "--name-status", base])?;

        let mut seen = HashSet::new();
        let files = stdout
            .lines()
            .filter_map(Self::parse_diff_line)
            .filter(|file| seen.insert(file.path.clone()))
            .collect();
        Ok(files)
    }

    fn resolve_ref(&self, reference: &str) -> Result<Inventory> {
        self.verify_ref(reference)?;

        // `./` resolves the path from repo_path rather than the repository top level
        let object = format!("{}:./{}", reference, self.inventory_path);
        let output = self.git(&["show", &object])?;
        if !output.status.success() {
            tracing::warn!(
                "No inventory at {}:{}, treating as empty",
                reference,
                self.inventory_path
            );
            return Ok(Inventory::new());
        }

        let content = String::from_utf8_lossy(&output.stdout);
        let (records, errors) = decode_all(&content);
        for error in &errors {
            tracing::warn!("Skipping inventory line at {}: {}", reference, error);
        }
        Ok(Inventory::from_records(records))
    }
}
