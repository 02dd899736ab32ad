//! Stateless comparison of two inventories.
//!
//! Matching uses the same identity key as reconciliation, but nothing is
//! merged or written: the output is a report for CI consumption.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::git::RevisionProvider;
use crate::inventory::{FunctionMetrics, FunctionRecord, Inventory, Metric};
use crate::quality::{find_violations, MetricViolation, RiskLevel, Thresholds};

/// Name under which the return-type flag appears in `metricsChanges`.
pub const HAS_RETURN_TYPE: &str = "hasReturnType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagChange {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricChange {
    Numeric { before: u32, after: u32, change: i64 },
    Flag { before: bool, after: bool, change: FlagChange },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFunction {
    pub before: FunctionRecord,
    pub after: FunctionRecord,
    pub metrics_changes: BTreeMap<String, MetricChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: Vec<FunctionRecord>,
    pub removed: Vec<FunctionRecord>,
    pub modified: Vec<ModifiedFunction>,
}

impl DiffResult {
    pub fn total_changes(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "+{} ~{} -{} (total: {})",
            self.added.len(),
            self.modified.len(),
            self.removed.len(),
            self.total_changes()
        )
    }
}

/// Compares `target` against `base`.
pub fn diff(base: &Inventory, target: &Inventory) -> DiffResult {
    let mut result = DiffResult::default();

    for record in target {
        match base.get(&record.key()) {
            None => result.added.push(record.clone()),
            Some(previous) if previous.content_hash != record.content_hash => {
                result.modified.push(ModifiedFunction {
                    metrics_changes: metric_changes(&previous.metrics, &record.metrics),
                    before: previous.clone(),
                    after: record.clone(),
                });
            }
            Some(_) => {}
        }
    }

    result.removed = base
        .iter()
        .filter(|record| !target.contains_key(&record.key()))
        .cloned()
        .collect();

    result
}

/// Per-metric deltas. A key is present only when both sides define the
/// metric and the values differ.
pub fn metric_changes(
    before: &FunctionMetrics,
    after: &FunctionMetrics,
) -> BTreeMap<String, MetricChange> {
    let mut changes = BTreeMap::new();

    for metric in Metric::ALL {
        if let (Some(b), Some(a)) = (before.get(metric), after.get(metric)) {
            if a != b {
                changes.insert(
                    metric.as_str().to_string(),
                    MetricChange::Numeric {
                        before: b,
                        after: a,
                        change: i64::from(a) - i64::from(b),
                    },
                );
            }
        }
    }

    if let (Some(b), Some(a)) = (before.has_return_type, after.has_return_type) {
        if a != b {
            let change = if a { FlagChange::Added } else { FlagChange::Removed };
            changes.insert(
                HAS_RETURN_TYPE.to_string(),
                MetricChange::Flag {
                    before: b,
                    after: a,
                    change,
                },
            );
        }
    }

    changes
}

/// Resolves both refs through the revision provider and diffs them.
pub fn diff_revisions(
    provider: &dyn RevisionProvider,
    base_ref: &str,
    target_ref: &str,
) -> Result<DiffResult> {
    let base = provider.resolve_ref(base_ref)?;
    let target = provider.resolve_ref(target_ref)?;
    let result = diff(&base, &target);
    tracing::info!("Diff {}..{}: {}", base_ref, target_ref, result.summary());
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    Added,
    Modified,
}

/// An added or modified function whose current metrics exceed thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateViolation {
    pub function_id: String,
    pub file: String,
    pub identifier: String,
    pub start_line: u32,
    pub origin: ChangeOrigin,
    pub risk_level: RiskLevel,
    pub violations: Vec<MetricViolation>,
}

/// Threshold gate over a diff, computed from the target side only.
pub fn gate(diff: &DiffResult, thresholds: &Thresholds, error_factor: f64) -> Vec<GateViolation> {
    let candidates = diff
        .added
        .iter()
        .map(|r| (r, ChangeOrigin::Added))
        .chain(diff.modified.iter().map(|m| (&m.after, ChangeOrigin::Modified)));

    candidates
        .filter_map(|(record, origin)| {
            let violations = find_violations(&record.metrics, thresholds, error_factor);
            if violations.is_empty() {
                return None;
            }
            Some(GateViolation {
                function_id: record.function_id(),
                file: record.file.clone(),
                identifier: record.identifier.clone(),
                start_line: record.start_line,
                origin,
                risk_level: RiskLevel::from_violation_count(violations.len()),
                violations,
            })
        })
        .collect()
}
