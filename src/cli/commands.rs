use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use func_tracker::diff::{diff, diff_revisions, gate, DiffResult, GateViolation};
use func_tracker::error::{Result, TrackerError};
use func_tracker::history::{apply_retention, collect, CommitContext, MetricsHistory, MetricsSnapshot};
use func_tracker::inventory::backup::now_millis;
use func_tracker::inventory::Inventory;
use func_tracker::quality::RiskLevel;
use func_tracker::reconcile::{preview, JsonlScanner, Reconciler, SourceScanner, UpdateOptions};
use func_tracker::{RevisionProvider, TrackerContext};

#[derive(Parser)]
#[command(name = "func-tracker")]
#[command(about = "Track function inventories and quality metrics across commits")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Merge fresh scanner output into the inventory
    func-tracker reconcile --scan scan.jsonl

    # Record metrics for the current commit
    func-tracker collect --pr 42

    # Functions over threshold, latest snapshot each
    func-tracker violations --min-risk medium

    # Compare inventories of two branches and gate on violations
    func-tracker diff main --target feature --fail-on-violation
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root containing .func-tracker.yml
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile scanner output into the persisted inventory
    Reconcile {
        /// Scanner output (JSON lines)
        #[arg(long)]
        scan: PathBuf,

        /// Inventory file (defaults to the configured path)
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Skip the backup taken before writing
        #[arg(long)]
        no_backup: bool,

        /// Classify only, write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate an inventory file, or every inventory in a directory
    Validate {
        path: Option<PathBuf>,
    },

    /// Write well-formed records of a damaged inventory to a new file
    Repair {
        path: Option<PathBuf>,
    },

    /// Back up inventory files
    Backup {
        paths: Vec<PathBuf>,
    },

    /// Restore a backup over the current files
    Restore {
        id: String,
    },

    /// List backups, newest first
    Backups,

    /// Record a metrics snapshot per function for a commit
    Collect {
        /// Inventory file (defaults to the configured path)
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Commit hash (defaults to git HEAD)
        #[arg(long)]
        commit: Option<String>,

        /// Branch name (defaults to the current git branch)
        #[arg(long)]
        branch: Option<String>,

        /// Parent commit (defaults to HEAD^ when available)
        #[arg(long)]
        parent: Option<String>,

        /// Pull request number
        #[arg(long)]
        pr: Option<u64>,

        /// Epoch milliseconds (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Query stored snapshots
    History {
        /// Function id (file::identifier)
        function: Option<String>,

        #[arg(long)]
        commit: Option<String>,

        #[arg(long)]
        pr: Option<u64>,

        /// Range start, epoch milliseconds
        #[arg(long, requires = "to")]
        from: Option<i64>,

        /// Range end, epoch milliseconds
        #[arg(long, requires = "from")]
        to: Option<i64>,

        /// Maximum number of snapshots
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Analyze the latest snapshot of every function against thresholds
    Violations {
        /// Only report functions at or above this risk level
        #[arg(long, value_parser = parse_risk, default_value = "medium")]
        min_risk: RiskLevel,
    },

    /// Compare the inventory at two revisions
    Diff {
        /// Base revision, or inventory file with --files
        base: String,

        /// Target revision, or inventory file with --files
        /// (defaults to the working copy inventory)
        #[arg(long)]
        target: Option<String>,

        /// Treat base and target as inventory file paths
        #[arg(long)]
        files: bool,

        /// Exit non-zero if added or modified functions violate thresholds
        #[arg(long)]
        fail_on_violation: bool,
    },

    /// Delete snapshots older than the retention window
    Prune {
        /// Overrides history.max_history_days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Show history store statistics
    Stats,
}

/// Whether the invocation passed its gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    GateFailed,
}

fn parse_risk(s: &str) -> std::result::Result<RiskLevel, String> {
    match s {
        "low" => Ok(RiskLevel::Low),
        "medium" => Ok(RiskLevel::Medium),
        "high" => Ok(RiskLevel::High),
        other => Err(format!("unknown risk level '{}' (low, medium, high)", other)),
    }
}

fn emit<T: Serialize + ?Sized>(format: OutputFormat, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", text()),
    }
    Ok(())
}

pub fn reconcile(
    ctx: &TrackerContext,
    format: OutputFormat,
    scan: &Path,
    inventory: Option<PathBuf>,
    no_backup: bool,
    dry_run: bool,
) -> Result<Outcome> {
    let store = ctx.open_store();
    let path = inventory.map(|p| ctx.resolve(p)).unwrap_or_else(|| ctx.inventory_path());
    let scanner = JsonlScanner::new(scan);
    let patterns = &ctx.config().scan;

    let result = if dry_run {
        let outcome = scanner.scan(ctx.root(), &patterns.include, &patterns.exclude)?;
        let loaded = store.load_or_empty(&path)?;
        preview(&loaded.inventory, &outcome)
    } else {
        let options = UpdateOptions {
            backup: ctx.config().inventory.backup_before_update && !no_backup,
        };
        Reconciler::new(&store).update_from_scanner(
            &path,
            &scanner,
            ctx.root(),
            &patterns.include,
            &patterns.exclude,
            options,
        )?
    };

    emit(format, &result, || {
        let mut out = format!(
            "{}: {} added, {} updated, {} deleted, {} unchanged ({}ms)",
            path.display(),
            result.added,
            result.updated,
            result.deleted,
            result.unchanged,
            result.execution_time_ms
        );
        if let Some(backup) = &result.backup {
            out.push_str(&format!("\nBackup: {}", backup.id));
        }
        for err in &result.errors {
            out.push_str(&format!("\nScan error in {}: {}", err.file, err.message));
        }
        out
    })?;
    Ok(Outcome::Success)
}

pub fn validate(ctx: &TrackerContext, format: OutputFormat, path: Option<PathBuf>) -> Result<Outcome> {
    let store = ctx.open_store();
    let path = path.map(|p| ctx.resolve(p)).unwrap_or_else(|| ctx.inventory_path());

    if path.is_dir() {
        let report = store.validate_dir(&path)?;
        emit(format, &report, || {
            let mut out = report.summary();
            for failure in &report.failed {
                out.push_str(&format!("\n  {}: {}", failure.path.display(), failure.error));
            }
            out
        })?;
        return Ok(if report.is_success() { Outcome::Success } else { Outcome::GateFailed });
    }

    let report = store.validate(&path)?;
    emit(format, &report, || {
        if report.valid {
            format!("{}: valid ({} records)", path.display(), report.records)
        } else {
            format!(
                "{}: invalid, {} malformed of {} lines{}\n  {}",
                path.display(),
                report.malformed,
                report.malformed + report.records,
                if report.recoverable { " (recoverable with repair)" } else { "" },
                report.error.as_deref().unwrap_or("")
            )
        }
    })?;
    Ok(if report.valid { Outcome::Success } else { Outcome::GateFailed })
}

pub fn repair(ctx: &TrackerContext, format: OutputFormat, path: Option<PathBuf>) -> Result<Outcome> {
    let path = path.map(|p| ctx.resolve(p)).unwrap_or_else(|| ctx.inventory_path());
    let report = ctx.open_store().repair(&path)?;
    emit(format, &report, || {
        format!(
            "Recovered {}, lost {}, written to {}",
            report.recovered,
            report.lost,
            report.repaired_path.display()
        )
    })?;
    Ok(Outcome::Success)
}

pub fn backup(ctx: &TrackerContext, format: OutputFormat, paths: Vec<PathBuf>) -> Result<Outcome> {
    let paths: Vec<PathBuf> = if paths.is_empty() {
        vec![ctx.inventory_path()]
    } else {
        paths.into_iter().map(|p| ctx.resolve(p)).collect()
    };
    let backup = ctx.open_store().backup(&paths)?;
    emit(format, &backup, || {
        format!(
            "Backup {} ({} bytes): {}",
            backup.id,
            backup.size_bytes,
            backup.file_names().join(", ")
        )
    })?;
    Ok(Outcome::Success)
}

pub fn restore(ctx: &TrackerContext, format: OutputFormat, id: &str) -> Result<Outcome> {
    let backup = ctx.open_store().restore(id)?;
    emit(format, &backup, || {
        let paths: Vec<String> = backup
            .files
            .iter()
            .map(|f| f.original_path.display().to_string())
            .collect();
        format!("Restored {}: {}", backup.id, paths.join(", "))
    })?;
    Ok(Outcome::Success)
}

pub fn list_backups(ctx: &TrackerContext, format: OutputFormat) -> Result<Outcome> {
    let backups = ctx.open_store().list_backups()?;
    emit(format, &backups, || {
        if backups.is_empty() {
            return "No backups found".to_string();
        }
        backups
            .iter()
            .map(|b| format!("{}  {} bytes  {}", b.id, b.size_bytes, b.file_names().join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(Outcome::Success)
}

#[allow(clippy::too_many_arguments)]
pub fn collect_metrics(
    ctx: &TrackerContext,
    format: OutputFormat,
    inventory: Option<PathBuf>,
    commit: Option<String>,
    branch: Option<String>,
    parent: Option<String>,
    pr: Option<u64>,
    timestamp: Option<i64>,
) -> Result<Outcome> {
    let path = inventory.map(|p| ctx.resolve(p)).unwrap_or_else(|| ctx.inventory_path());
    let loaded = ctx.open_store().load(&path)?;

    // Only touch git for what was not given explicitly
    let (commit, branch, parent) = match (commit, branch) {
        (Some(commit), Some(branch)) => (commit, branch, parent),
        (commit, branch) => {
            let git = ctx.revision_provider()?;
            let parent = match parent {
                Some(p) => Some(p),
                None => git.parent_commit()?,
            };
            (
                commit.map_or_else(|| git.current_commit(), Ok)?,
                branch.map_or_else(|| git.current_branch(), Ok)?,
                parent,
            )
        }
    };

    let mut context = CommitContext::new(commit, branch, timestamp.unwrap_or_else(now_millis));
    if let Some(parent) = parent {
        context = context.with_parent(parent);
    }
    if let Some(pr) = pr {
        context = context.with_pr(pr);
    }

    let history = ctx.open_history()?;
    let report = collect(&history, &loaded.inventory, &context, &ctx.config().change_policy)?;
    emit(format, &report, || {
        format!(
            "Recorded {} snapshots for {} ({} created, {} modified, {} refactored, {} skipped incomplete)",
            report.recorded,
            context.commit_hash,
            report.created,
            report.modified,
            report.refactored,
            report.skipped_incomplete
        )
    })?;
    Ok(Outcome::Success)
}

fn format_snapshot(s: &MetricsSnapshot) -> String {
    format!(
        "{}  {}  {}  {}  cyc={} cog={} loc={} nest={} params={}",
        s.timestamp,
        s.commit_hash,
        s.function_id,
        s.change_type.as_str(),
        s.cyclomatic_complexity,
        s.cognitive_complexity,
        s.lines_of_code,
        s.nesting_depth,
        s.parameter_count
    )
}

#[allow(clippy::too_many_arguments)]
pub fn history(
    ctx: &TrackerContext,
    format: OutputFormat,
    function: Option<String>,
    commit: Option<String>,
    pr: Option<u64>,
    from: Option<i64>,
    to: Option<i64>,
    limit: Option<usize>,
) -> Result<Outcome> {
    let history = ctx.open_history()?;

    let mut snapshots = match (function, commit, pr, from.zip(to)) {
        (Some(function), None, None, None) => history.history_of(&function, limit)?,
        (None, Some(commit), None, None) => history.by_commit(&commit)?,
        (None, None, Some(pr), None) => history.by_pr(pr)?,
        (None, None, None, Some((from, to))) => history.by_date_range(from, to)?,
        _ => {
            return Err(TrackerError::Config(
                "history needs exactly one of: <function>, --commit, --pr, --from/--to".to_string(),
            ))
        }
    };
    if let Some(limit) = limit {
        snapshots.truncate(limit);
    }

    emit(format, &snapshots, || {
        if snapshots.is_empty() {
            return "No snapshots found".to_string();
        }
        snapshots.iter().map(format_snapshot).collect::<Vec<_>>().join("\n")
    })?;
    Ok(Outcome::Success)
}

pub fn violations(ctx: &TrackerContext, format: OutputFormat, min_risk: RiskLevel) -> Result<Outcome> {
    let history = ctx.open_history()?;
    let mut analyses = history.analyze_violations(&ctx.config().thresholds, ctx.error_factor())?;
    analyses.retain(|a| a.risk_level >= min_risk);

    emit(format, &analyses, || {
        if analyses.is_empty() {
            return "No violations".to_string();
        }
        analyses
            .iter()
            .map(|a| {
                let details: Vec<String> = a
                    .violations
                    .iter()
                    .map(|v| format!("{}={}>{} ({})", v.metric, v.value, v.threshold, v.severity.as_str()))
                    .collect();
                format!(
                    "[{}] {} ({}): {}",
                    a.risk_level.as_str(),
                    a.function_id,
                    a.trend.as_str(),
                    details.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(Outcome::Success)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiffReport<'a> {
    #[serde(flatten)]
    diff: &'a DiffResult,
    violations: &'a [GateViolation],
}

pub fn diff_inventories(
    ctx: &TrackerContext,
    format: OutputFormat,
    base: &str,
    target: Option<&str>,
    files: bool,
    fail_on_violation: bool,
) -> Result<Outcome> {
    let store = ctx.open_store();
    let working_copy = || -> Result<Inventory> {
        Ok(store.load_or_empty(ctx.inventory_path())?.inventory)
    };

    let result = match (files, target) {
        (true, target) => {
            let base_inv = store.load(ctx.resolve(base))?.inventory;
            let target_inv = match target {
                Some(t) => store.load(ctx.resolve(t))?.inventory,
                None => working_copy()?,
            };
            diff(&base_inv, &target_inv)
        }
        (false, Some(target)) => diff_revisions(&ctx.revision_provider()?, base, target)?,
        (false, None) => {
            let base_inv = ctx.revision_provider()?.resolve_ref(base)?;
            diff(&base_inv, &working_copy()?)
        }
    };

    let violations = gate(&result, &ctx.config().thresholds, ctx.error_factor());
    let report = DiffReport {
        diff: &result,
        violations: &violations,
    };

    emit(format, &report, || {
        let mut out = result.summary();
        for record in &result.added {
            out.push_str(&format!("\n+ {}", record.key()));
        }
        for modified in &result.modified {
            let changes: Vec<String> = modified
                .metrics_changes
                .keys()
                .map(|k| k.to_string())
                .collect();
            out.push_str(&format!("\n~ {} [{}]", modified.after.key(), changes.join(", ")));
        }
        for record in &result.removed {
            out.push_str(&format!("\n- {}", record.key()));
        }
        for v in &violations {
            out.push_str(&format!(
                "\n! {} ({:?}, {} risk): {} violation(s)",
                v.function_id,
                v.origin,
                v.risk_level.as_str(),
                v.violations.len()
            ));
        }
        out
    })?;

    if fail_on_violation && !violations.is_empty() {
        return Ok(Outcome::GateFailed);
    }
    Ok(Outcome::Success)
}

pub fn prune(ctx: &TrackerContext, format: OutputFormat, days: Option<u32>) -> Result<Outcome> {
    let days = days.or(ctx.config().history.max_history_days).ok_or_else(|| {
        TrackerError::Config("no retention window: pass --days or set history.max_history_days".to_string())
    })?;
    if days == 0 {
        return Err(TrackerError::Config("--days must be greater than zero".to_string()));
    }

    let history = ctx.open_history()?;
    let removed = apply_retention(&history, days, now_millis())?;
    emit(format, &serde_json::json!({ "removed": removed, "days": days }), || {
        format!("Removed {} snapshots older than {} days", removed, days)
    })?;
    Ok(Outcome::Success)
}

pub fn stats(ctx: &TrackerContext, format: OutputFormat) -> Result<Outcome> {
    let stats = ctx.open_history()?.stats()?;
    emit(format, &stats, || {
        format!(
            "History Statistics:\n  Snapshots: {}\n  Functions: {}\n  Commits: {}",
            stats.total_snapshots, stats.functions, stats.commits
        )
    })?;
    Ok(Outcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_diff() {
        let cli = Cli::try_parse_from([
            "func-tracker",
            "--format",
            "json",
            "diff",
            "main",
            "--target",
            "feature",
            "--fail-on-violation",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Diff { base, target, files, fail_on_violation } => {
                assert_eq!(base, "main");
                assert_eq!(target.as_deref(), Some("feature"));
                assert!(!files);
                assert!(fail_on_violation);
            }
            _ => panic!("expected diff"),
        }
    }

    #[test]
    fn test_parse_risk() {
        assert_eq!(parse_risk("high"), Ok(RiskLevel::High));
        assert!(parse_risk("severe").is_err());
    }
}
