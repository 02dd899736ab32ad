//! Project configuration loaded from `.func-tracker.yml`.
//!
//! Format (version 2):
//! ```yaml
//! version: 2
//! thresholds:
//!   cyclomatic_complexity: 10
//!   cognitive_complexity: 15
//!   lines_of_code: 50
//!   nesting_depth: 4
//!   parameter_count: 5
//! change_policy:
//!   complexity_delta: 3
//!   lines_of_code_delta: 10
//!   nesting_delta: 1
//! violations:
//!   severity_error_factor: 1.5
//! inventory:
//!   path: .func-tracker/functions.jsonl
//! history:
//!   max_history_days: 90
//! scan:
//!   include: ["src/*"]
//! ```
//!
//! Files without a `version` (or with `version: 1`) use the legacy flat
//! layout and are migrated when loaded.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::history::ChangePolicy;
use crate::quality::{Thresholds, DEFAULT_SEVERITY_ERROR_FACTOR};

/// Name of the configuration file at the project root
pub const CONFIG_FILENAME: &str = ".func-tracker.yml";

pub const CONFIG_VERSION: u32 = 2;

const LEGACY_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    pub version: u32,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub change_policy: ChangePolicy,
    #[serde(default)]
    pub violations: ViolationSettings,
    #[serde(default)]
    pub inventory: InventorySettings,
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub scan: ScanSettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            thresholds: Thresholds::default(),
            change_policy: ChangePolicy::default(),
            violations: ViolationSettings::default(),
            inventory: InventorySettings::default(),
            history: HistorySettings::default(),
            scan: ScanSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViolationSettings {
    /// Values above `factor * threshold` are reported as errors
    pub severity_error_factor: f64,
}

impl Default for ViolationSettings {
    fn default() -> Self {
        Self {
            severity_error_factor: DEFAULT_SEVERITY_ERROR_FACTOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventorySettings {
    pub path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_before_update: bool,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".func-tracker/functions.jsonl"),
            backup_dir: PathBuf::from(".func-tracker/backups"),
            backup_before_update: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistorySettings {
    pub db_path: PathBuf,
    /// Retention applied by `prune`; `None` keeps everything
    pub max_history_days: Option<u32>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".func-tracker/history.db"),
            max_history_days: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanSettings {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl TrackerConfig {
    /// Loads `<root>/.func-tracker.yml`, falling back to defaults when absent.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(CONFIG_FILENAME);
        if !path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILENAME, root.as_ref().display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| match e {
            TrackerError::Config(msg) => TrackerError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parses and validates configuration text, migrating legacy layouts.
    pub fn parse(content: &str) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(content).map_err(yaml_error)?;
        if value.is_null() {
            return Ok(Self::default());
        }

        let version = match value.get("version") {
            None => LEGACY_CONFIG_VERSION,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| TrackerError::Config("version must be a positive integer".to_string()))?,
        };

        let config = match version {
            LEGACY_CONFIG_VERSION => {
                if let Some(map) = value.as_mapping_mut() {
                    map.remove("version");
                }
                let legacy: LegacyConfig = serde_yaml::from_value(value).map_err(yaml_error)?;
                tracing::info!("Migrating legacy configuration to version {}", CONFIG_VERSION);
                legacy.migrate()
            }
            CONFIG_VERSION => serde_yaml::from_value(value).map_err(yaml_error)?,
            other => {
                return Err(TrackerError::Config(format!(
                    "unsupported config version {} (expected {})",
                    other, CONFIG_VERSION
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.change_policy.validate()?;

        let factor = self.violations.severity_error_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(TrackerError::Config(format!(
                "severity_error_factor must be at least 1.0, got {}",
                factor
            )));
        }

        if self.inventory.path.as_os_str().is_empty() {
            return Err(TrackerError::Config("inventory.path must not be empty".to_string()));
        }
        if self.inventory.backup_dir.as_os_str().is_empty() {
            return Err(TrackerError::Config("inventory.backup_dir must not be empty".to_string()));
        }
        if self.history.db_path.as_os_str().is_empty() {
            return Err(TrackerError::Config("history.db_path must not be empty".to_string()));
        }
        if self.history.max_history_days == Some(0) {
            return Err(TrackerError::Config(
                "history.max_history_days must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn yaml_error(e: serde_yaml::Error) -> TrackerError {
    TrackerError::Config(e.to_string())
}

/// Flat version-1 layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LegacyConfig {
    thresholds: LegacyThresholds,
    inventory_path: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    history_db: Option<PathBuf>,
    max_history_days: Option<u32>,
    include: Vec<String>,
    exclude: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LegacyThresholds {
    complexity: Option<u32>,
    cognitive: Option<u32>,
    lines: Option<u32>,
    nesting: Option<u32>,
    params: Option<u32>,
}

impl LegacyConfig {
    fn migrate(self) -> TrackerConfig {
        let defaults = TrackerConfig::default();
        let t = self.thresholds;

        TrackerConfig {
            version: CONFIG_VERSION,
            thresholds: Thresholds {
                cyclomatic_complexity: t.complexity.unwrap_or(defaults.thresholds.cyclomatic_complexity),
                cognitive_complexity: t.cognitive.unwrap_or(defaults.thresholds.cognitive_complexity),
                lines_of_code: t.lines.unwrap_or(defaults.thresholds.lines_of_code),
                nesting_depth: t.nesting.unwrap_or(defaults.thresholds.nesting_depth),
                parameter_count: t.params.unwrap_or(defaults.thresholds.parameter_count),
            },
            inventory: InventorySettings {
                path: self.inventory_path.unwrap_or(defaults.inventory.path),
                backup_dir: self.backup_dir.unwrap_or(defaults.inventory.backup_dir),
                ..defaults.inventory
            },
            history: HistorySettings {
                db_path: self.history_db.unwrap_or(defaults.history.db_path),
                max_history_days: self.max_history_days,
            },
            scan: ScanSettings {
                include: self.include,
                exclude: self.exclude,
            },
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = TrackerConfig::load(dir.path()).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.thresholds.cyclomatic_complexity, 10);
        assert_eq!(config.violations.severity_error_factor, 1.5);
    }

    #[test]
    fn test_parse_current_layout() {
        let yaml = r#"
version: 2
thresholds:
  cyclomatic_complexity: 8
  cognitive_complexity: 12
  lines_of_code: 40
  nesting_depth: 3
  parameter_count: 4
violations:
  severity_error_factor: 2.0
history:
  max_history_days: 30
scan:
  exclude: ["*.test.ts"]
"#;
        let config = TrackerConfig::parse(yaml).unwrap();
        assert_eq!(config.thresholds.cyclomatic_complexity, 8);
        assert_eq!(config.violations.severity_error_factor, 2.0);
        assert_eq!(config.history.max_history_days, Some(30));
        assert_eq!(config.history.db_path, PathBuf::from(".func-tracker/history.db"));
        assert_eq!(config.scan.exclude, vec!["*.test.ts".to_string()]);
        assert!(config.inventory.backup_before_update);
    }

    #[test]
    fn test_legacy_layout_is_migrated() {
        let yaml = r#"
thresholds:
  complexity: 12
  lines: 80
inventory_path: data/functions.jsonl
max_history_days: 14
"#;
        let config = TrackerConfig::parse(yaml).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.thresholds.cyclomatic_complexity, 12);
        assert_eq!(config.thresholds.lines_of_code, 80);
        assert_eq!(config.thresholds.cognitive_complexity, 15);
        assert_eq!(config.inventory.path, PathBuf::from("data/functions.jsonl"));
        assert_eq!(config.history.max_history_days, Some(14));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = "version: 2\nhistory:\n  retention: 3\n";
        assert!(matches!(TrackerConfig::parse(yaml), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_threshold = "thresholds:\n  nesting: 0\n";
        assert_eq!(TrackerConfig::parse(zero_threshold).unwrap().thresholds.nesting_depth, 0);

        let low_factor = "version: 2\nviolations:\n  severity_error_factor: 0.5\n";
        assert!(TrackerConfig::parse(low_factor).is_err());

        let future = "version: 9\n";
        assert!(TrackerConfig::parse(future).is_err());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "version: 2\nbogus: true\n").unwrap();

        let err = TrackerConfig::load(dir.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(CONFIG_FILENAME));
        assert_eq!(message.matches("Configuration error").count(), 1);
    }
}
