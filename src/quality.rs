//! Threshold vocabulary shared by history analysis and diff gating.

use serde::{Deserialize, Serialize};

use crate::inventory::{FunctionMetrics, Metric};

/// Default multiplier above which a violation is an error instead of a warning.
pub const DEFAULT_SEVERITY_ERROR_FACTOR: f64 = 1.5;

/// Numeric ceilings, one per metric. Values above the ceiling are violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    pub cyclomatic_complexity: u32,
    pub cognitive_complexity: u32,
    pub lines_of_code: u32,
    pub nesting_depth: u32,
    pub parameter_count: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cyclomatic_complexity: 10,
            cognitive_complexity: 15,
            lines_of_code: 50,
            nesting_depth: 4,
            parameter_count: 5,
        }
    }
}

impl Thresholds {
    pub fn get(&self, metric: Metric) -> u32 {
        match metric {
            Metric::CyclomaticComplexity => self.cyclomatic_complexity,
            Metric::CognitiveComplexity => self.cognitive_complexity,
            Metric::LinesOfCode => self.lines_of_code,
            Metric::NestingDepth => self.nesting_depth,
            Metric::ParameterCount => self.parameter_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn classify(value: u32, threshold: u32, error_factor: f64) -> Self {
        if f64::from(value) > f64::from(threshold) * error_factor {
            Severity::Error
        } else {
            Severity::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricViolation {
    pub metric: Metric,
    pub value: u32,
    pub threshold: u32,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// 0 violations: low, 1-2: medium, 3 or more: high.
    pub fn from_violation_count(count: usize) -> Self {
        match count {
            0 => RiskLevel::Low,
            1 | 2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Flags every metric whose value is strictly greater than its ceiling.
/// Metrics that were not computed are never flagged.
pub fn find_violations(
    metrics: &FunctionMetrics,
    thresholds: &Thresholds,
    error_factor: f64,
) -> Vec<MetricViolation> {
    Metric::ALL
        .iter()
        .filter_map(|&metric| {
            let value = metrics.get(metric)?;
            let threshold = thresholds.get(metric);
            (value > threshold).then(|| MetricViolation {
                metric,
                value,
                threshold,
                severity: Severity::classify(value, threshold, error_factor),
            })
        })
        .collect()
}
