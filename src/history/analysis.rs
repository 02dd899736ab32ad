//! Trend, risk and change-type classification over snapshot series.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::history::{ChangeType, MetricsSnapshot, Trend, ViolationAnalysis};
use crate::inventory::{FunctionMetrics, Metric};
use crate::quality::{find_violations, RiskLevel, Thresholds};

/// Deltas above which a change counts as a refactoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePolicy {
    /// Applies to cyclomatic and cognitive complexity
    pub complexity_delta: u32,
    pub lines_of_code_delta: u32,
    pub nesting_delta: u32,
}

impl Default for ChangePolicy {
    fn default() -> Self {
        Self {
            complexity_delta: 3,
            lines_of_code_delta: 10,
            nesting_delta: 1,
        }
    }
}

impl ChangePolicy {
    pub fn validate(&self) -> Result<()> {
        if self.complexity_delta == 0 || self.lines_of_code_delta == 0 || self.nesting_delta == 0 {
            return Err(TrackerError::Config(
                "change_policy deltas must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// No previous snapshot: created. Any delta over its limit: refactored.
    pub fn classify(&self, previous: Option<&MetricsSnapshot>, current: &FunctionMetrics) -> ChangeType {
        let Some(previous) = previous else {
            return ChangeType::Created;
        };

        let delta = |metric: Metric| {
            current
                .get(metric)
                .map(|v| v.abs_diff(previous.value(metric)))
                .unwrap_or(0)
        };

        let significant = delta(Metric::CyclomaticComplexity) > self.complexity_delta
            || delta(Metric::CognitiveComplexity) > self.complexity_delta
            || delta(Metric::LinesOfCode) > self.lines_of_code_delta
            || delta(Metric::NestingDepth) > self.nesting_delta;

        if significant {
            ChangeType::Refactored
        } else {
            ChangeType::Modified
        }
    }
}

/// Compares the latest snapshot to the one before it.
pub fn classify_trend(latest: &MetricsSnapshot, previous: Option<&MetricsSnapshot>) -> Trend {
    let Some(previous) = previous else {
        return Trend::New;
    };

    let mut increased = false;
    let mut decreased = false;
    for metric in Metric::ALL {
        let (now, before) = (latest.value(metric), previous.value(metric));
        increased |= now > before;
        decreased |= now < before;
    }

    match (increased, decreased) {
        (false, true) => Trend::Improving,
        (true, false) => Trend::Degrading,
        _ => Trend::Stable,
    }
}

/// Analyses one function. `history` must be ordered most recent first.
pub fn analyze_function(
    history: &[MetricsSnapshot],
    snapshot_count: usize,
    thresholds: &Thresholds,
    error_factor: f64,
) -> Option<ViolationAnalysis> {
    let latest = history.first()?;
    let violations = find_violations(&latest.metrics(), thresholds, error_factor);

    Some(ViolationAnalysis {
        function_id: latest.function_id.clone(),
        risk_level: RiskLevel::from_violation_count(violations.len()),
        violations,
        trend: classify_trend(latest, history.get(1)),
        commit_hash: latest.commit_hash.clone(),
        snapshot_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::CommitContext;
    use crate::inventory::FunctionRecord;

    fn snapshot(values: [u32; 5]) -> MetricsSnapshot {
        let [cyc, cog, loc, nest, params] = values;
        let metrics = FunctionMetrics::default()
            .with(Metric::CyclomaticComplexity, cyc)
            .with(Metric::CognitiveComplexity, cog)
            .with(Metric::LinesOfCode, loc)
            .with(Metric::NestingDepth, nest)
            .with(Metric::ParameterCount, params);
        let record = FunctionRecord::new("a.ts", "foo", 1, 10, "h").with_metrics(metrics);
        MetricsSnapshot::from_record(&record, &CommitContext::new("c", "main", 0), ChangeType::Modified)
            .unwrap()
    }

    #[test]
    fn test_trend_new_without_previous() {
        assert_eq!(classify_trend(&snapshot([1, 1, 1, 1, 1]), None), Trend::New);
    }

    #[test]
    fn test_trend_improving() {
        let before = snapshot([10, 15, 50, 3, 4]);
        let after = snapshot([5, 8, 30, 2, 3]);
        assert_eq!(classify_trend(&after, Some(&before)), Trend::Improving);
    }

    #[test]
    fn test_trend_degrading_and_stable() {
        let base = snapshot([5, 5, 20, 2, 2]);
        assert_eq!(classify_trend(&snapshot([6, 5, 20, 2, 2]), Some(&base)), Trend::Degrading);
        assert_eq!(classify_trend(&snapshot([5, 5, 20, 2, 2]), Some(&base)), Trend::Stable);
        assert_eq!(classify_trend(&snapshot([6, 4, 20, 2, 2]), Some(&base)), Trend::Stable);
    }

    #[test]
    fn test_analyze_function_risk_levels() {
        let thresholds = Thresholds::default();

        let all_over = [snapshot([100, 100, 500, 40, 50])];
        let analysis = analyze_function(&all_over, 1, &thresholds, 1.5).unwrap();
        assert_eq!(analysis.violations.len(), 5);
        assert_eq!(analysis.risk_level, RiskLevel::High);
        assert_eq!(analysis.trend, Trend::New);

        let clean = [snapshot([1, 1, 1, 1, 1])];
        let analysis = analyze_function(&clean, 1, &thresholds, 1.5).unwrap();
        assert!(analysis.violations.is_empty());
        assert_eq!(analysis.risk_level, RiskLevel::Low);

        assert!(analyze_function(&[], 0, &thresholds, 1.5).is_none());
    }

    #[test]
    fn test_change_policy_classification() {
        let policy = ChangePolicy::default();
        let previous = snapshot([5, 5, 20, 2, 2]);

        assert_eq!(policy.classify(None, &previous.metrics()), ChangeType::Created);
        assert_eq!(
            policy.classify(Some(&previous), &snapshot([8, 8, 30, 3, 2]).metrics()),
            ChangeType::Modified
        );
        assert_eq!(
            policy.classify(Some(&previous), &snapshot([9, 5, 20, 2, 2]).metrics()),
            ChangeType::Refactored
        );
        assert_eq!(
            policy.classify(Some(&previous), &snapshot([5, 5, 9, 2, 2]).metrics()),
            ChangeType::Refactored
        );
        assert_eq!(
            policy.classify(Some(&previous), &snapshot([5, 5, 20, 0, 2]).metrics()),
            ChangeType::Refactored
        );
    }

    #[test]
    fn test_change_policy_rejects_zero() {
        let policy = ChangePolicy {
            nesting_delta: 0,
            ..ChangePolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
