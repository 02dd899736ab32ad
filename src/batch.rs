use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One failed item of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Per-item tally for operations spanning several inventories.
///
/// Batches never abort on a single item's failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, path: impl AsRef<Path>) {
        self.succeeded.push(path.as_ref().to_path_buf());
    }

    pub fn record_failure(&mut self, path: impl AsRef<Path>, error: impl ToString) {
        self.failed.push(BatchFailure {
            path: path.as_ref().to_path_buf(),
            error: error.to_string(),
        });
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed (total: {})",
            self.succeeded.len(),
            self.failed.len(),
            self.total()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_report_tally() {
        let mut report = BatchReport::new();
        report.record_success("a.jsonl");
        report.record_failure("b.jsonl", "permission denied");
        report.record_success("c.jsonl");

        assert_eq!(report.total(), 3);
        assert!(!report.is_success());
        assert_eq!(report.summary(), "2 succeeded, 1 failed (total: 3)");
        assert_eq!(report.failed[0].path, PathBuf::from("b.jsonl"));
    }
}
