//! Source scanner seam.
//!
//! The tracker never parses source code. A scanner hands over one record per
//! function plus the files it could not process.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{LineErrorKind, Result, TrackerError};
use crate::inventory::{decode_line, FunctionRecord};

/// A file the scanner could not process. Reported, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanError {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub records: Vec<FunctionRecord>,
    pub errors: Vec<ScanError>,
}

impl ScanOutcome {
    pub fn new(records: Vec<FunctionRecord>) -> Self {
        Self {
            records,
            errors: Vec::new(),
        }
    }

    pub fn with_error(mut self, file: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.push(ScanError {
            file: file.into(),
            message: message.into(),
        });
        self
    }

    pub fn failed_files(&self) -> HashSet<&str> {
        self.errors.iter().map(|e| e.file.as_str()).collect()
    }
}

pub trait SourceScanner {
    fn scan(&self, root: &Path, include: &[String], exclude: &[String]) -> Result<ScanOutcome>;
}

/// Error line emitted by an external scanner for a file it failed on.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanErrorLine {
    file: String,
    scan_error: String,
}

/// Reads the line-delimited output of an external scanner.
///
/// Each line is either a function record or `{"file": ..., "scanError": ...}`.
pub struct JsonlScanner {
    output: PathBuf,
}

impl JsonlScanner {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl SourceScanner for JsonlScanner {
    fn scan(&self, root: &Path, include: &[String], exclude: &[String]) -> Result<ScanOutcome> {
        let path = if self.output.is_absolute() {
            self.output.clone()
        } else {
            root.join(&self.output)
        };
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                TrackerError::NotFound(format!("scan output {}", path.display()))
            }
            _ => TrackerError::Io(e),
        })?;

        let filter = PathFilter::new(include, exclude)?;
        let mut outcome = ScanOutcome::default();

        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            if line.contains("\"scanError\"") {
                if let Ok(err) = serde_json::from_str::<ScanErrorLine>(line) {
                    if filter.matches(&err.file) {
                        outcome.errors.push(ScanError {
                            file: err.file,
                            message: err.scan_error,
                        });
                    }
                    continue;
                }
            }

            match decode_line(idx + 1, line) {
                Ok(record) if filter.matches(&record.file) => outcome.records.push(record),
                Ok(_) => {}
                Err(e) => {
                    // Charge the failure to the record's own file when it names one
                    let file = match e.kind {
                        LineErrorKind::Schema => record_file(line),
                        LineErrorKind::Parse => None,
                    };
                    match file {
                        Some(file) if !filter.matches(&file) => {}
                        Some(file) => outcome.errors.push(ScanError {
                            file,
                            message: e.to_string(),
                        }),
                        None => outcome.errors.push(ScanError {
                            file: path.display().to_string(),
                            message: e.to_string(),
                        }),
                    }
                }
            }
        }

        tracing::debug!(
            "Scanner output {}: {} records, {} errors",
            path.display(),
            outcome.records.len(),
            outcome.errors.len()
        );
        Ok(outcome)
    }
}

/// `file` (or legacy `filePath`) of a line that is JSON but not a valid record.
fn record_file(line: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value
        .get("file")
        .or_else(|| value.get("filePath"))
        .and_then(|f| f.as_str())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

/// Include/exclude glob filter over relative file paths.
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Empty include list admits everything; any exclude match rejects.
    pub fn matches(&self, file: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(file));
        included && !self.exclude.iter().any(|p| p.matches(file))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| TrackerError::Config(format!("invalid glob pattern '{}': {}", p, e)))
        })
        .collect()
}
