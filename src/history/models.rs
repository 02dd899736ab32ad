use serde::{Deserialize, Serialize};

use crate::inventory::{FunctionMetrics, FunctionRecord, Metric};
use crate::quality::{MetricViolation, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Refactored,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Refactored => "refactored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ChangeType::Created),
            "modified" => Some(ChangeType::Modified),
            "refactored" => Some(ChangeType::Refactored),
            _ => None,
        }
    }
}

/// Commit context a metrics collection run is tagged with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitContext {
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_commit: Option<String>,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl CommitContext {
    pub fn new(commit_hash: impl Into<String>, branch_name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            parent_commit: None,
            branch_name: branch_name.into(),
            pr_number: None,
            timestamp,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_commit = Some(parent.into());
        self
    }

    pub fn with_pr(mut self, pr_number: u64) -> Self {
        self.pr_number = Some(pr_number);
        self
    }
}

/// One immutable historical measurement of a function at a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// `file::identifier`, deliberately free of line numbers
    pub function_id: String,
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_commit: Option<String>,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    pub timestamp: i64,
    pub change_type: ChangeType,
    pub cyclomatic_complexity: u32,
    pub cognitive_complexity: u32,
    pub lines_of_code: u32,
    pub nesting_depth: u32,
    pub parameter_count: u32,
}

impl MetricsSnapshot {
    /// Builds a snapshot from a record. Returns `None` when any of the five
    /// metrics was not computed: incomplete measurements are not recorded.
    pub fn from_record(
        record: &FunctionRecord,
        context: &CommitContext,
        change_type: ChangeType,
    ) -> Option<Self> {
        let m = &record.metrics;
        Some(Self {
            function_id: record.function_id(),
            commit_hash: context.commit_hash.clone(),
            parent_commit: context.parent_commit.clone(),
            branch_name: context.branch_name.clone(),
            pr_number: context.pr_number,
            timestamp: context.timestamp,
            change_type,
            cyclomatic_complexity: m.cyclomatic_complexity?,
            cognitive_complexity: m.cognitive_complexity?,
            lines_of_code: m.lines_of_code?,
            nesting_depth: m.nesting_depth?,
            parameter_count: m.parameter_count?,
        })
    }

    pub fn value(&self, metric: Metric) -> u32 {
        match metric {
            Metric::CyclomaticComplexity => self.cyclomatic_complexity,
            Metric::CognitiveComplexity => self.cognitive_complexity,
            Metric::LinesOfCode => self.lines_of_code,
            Metric::NestingDepth => self.nesting_depth,
            Metric::ParameterCount => self.parameter_count,
        }
    }

    pub fn metrics(&self) -> FunctionMetrics {
        Metric::ALL
            .iter()
            .fold(FunctionMetrics::default(), |m, &metric| m.with(metric, self.value(metric)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
    New,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Degrading => "degrading",
            Trend::Stable => "stable",
            Trend::New => "new",
        }
    }
}

/// Derived view of a function's latest snapshot against thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationAnalysis {
    pub function_id: String,
    pub violations: Vec<MetricViolation>,
    pub risk_level: RiskLevel,
    pub trend: Trend,
    /// Commit of the snapshot the analysis is based on
    pub commit_hash: String,
    pub snapshot_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_snapshots: usize,
    pub functions: usize,
    pub commits: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

/// Outcome of turning an inventory into snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectReport {
    pub recorded: usize,
    /// Records skipped because a metric was not computed
    pub skipped_incomplete: usize,
    pub created: usize,
    pub modified: usize,
    pub refactored: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_metrics() -> FunctionMetrics {
        FunctionMetrics::default()
            .with(Metric::CyclomaticComplexity, 3)
            .with(Metric::CognitiveComplexity, 4)
            .with(Metric::LinesOfCode, 20)
            .with(Metric::NestingDepth, 2)
            .with(Metric::ParameterCount, 1)
    }

    #[test]
    fn test_from_record_requires_all_metrics() {
        let ctx = CommitContext::new("abc", "main", 1_000).with_pr(42);
        let full = FunctionRecord::new("a.ts", "foo", 1, 20, "h").with_metrics(complete_metrics());
        let partial = FunctionRecord::new("a.ts", "bar", 1, 20, "h")
            .with_metrics(FunctionMetrics::default().with(Metric::LinesOfCode, 3));

        let snapshot = MetricsSnapshot::from_record(&full, &ctx, ChangeType::Created).unwrap();
        assert_eq!(snapshot.function_id, "a.ts::foo");
        assert_eq!(snapshot.pr_number, Some(42));
        assert_eq!(snapshot.value(Metric::LinesOfCode), 20);
        assert_eq!(snapshot.metrics(), complete_metrics());

        assert!(MetricsSnapshot::from_record(&partial, &ctx, ChangeType::Created).is_none());
    }

    #[test]
    fn test_change_type_strings() {
        for ct in [ChangeType::Created, ChangeType::Modified, ChangeType::Refactored] {
            assert_eq!(ChangeType::from_str(ct.as_str()), Some(ct));
        }
        assert_eq!(ChangeType::from_str("deleted"), None);
    }
}
