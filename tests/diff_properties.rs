//! Revision diff: symmetry, delta precision and git-backed ref resolution.

use std::fs;
use std::path::Path;
use std::process::Command;

use func_tracker::diff::{diff, diff_revisions, gate, MetricChange};
use func_tracker::git::{ChangeStatus, GitRevisionProvider, RevisionProvider};
use func_tracker::inventory::{FunctionMetrics, FunctionRecord, Inventory, InventoryStore, Metric};
use func_tracker::quality::Thresholds;
use tempfile::TempDir;

fn rec(file: &str, id: &str, start: u32, hash: &str, loc: u32) -> FunctionRecord {
    FunctionRecord::new(file, id, start, start + loc, hash)
        .with_metrics(FunctionMetrics::default().with(Metric::LinesOfCode, loc))
}

fn keys(records: &[FunctionRecord]) -> Vec<String> {
    let mut keys: Vec<String> = records.iter().map(|r| r.key().to_string()).collect();
    keys.sort();
    keys
}

fn samples() -> Vec<Inventory> {
    vec![
        Inventory::new(),
        Inventory::from_records(vec![rec("a.ts", "foo", 1, "h1", 10)]),
        Inventory::from_records(vec![rec("a.ts", "foo", 1, "h2", 12), rec("a.ts", "bar", 20, "h3", 5)]),
        Inventory::from_records(vec![rec("b.ts", "baz", 3, "h4", 7), rec("a.ts", "bar", 20, "h3", 5)]),
        Inventory::from_records(vec![rec("a.ts", "foo", 2, "h1", 10)]),
    ]
}

#[test]
fn test_diff_is_symmetric() {
    let inventories = samples();
    for a in &inventories {
        for b in &inventories {
            let forward = diff(a, b);
            let backward = diff(b, a);
            assert_eq!(keys(&forward.added), keys(&backward.removed));
            assert_eq!(keys(&forward.removed), keys(&backward.added));
            assert_eq!(forward.modified.len(), backward.modified.len());
        }
    }
}

#[test]
fn test_self_diff_is_empty() {
    for inventory in samples() {
        assert!(diff(&inventory, &inventory).is_empty());
    }
}

#[test]
fn test_metric_deltas_are_exact() {
    let inventories = samples();
    for a in &inventories {
        for b in &inventories {
            for modified in diff(a, b).modified {
                for (name, change) in &modified.metrics_changes {
                    if let MetricChange::Numeric { before, after, change } = change {
                        assert_ne!(before, after, "{} reported without a change", name);
                        assert_eq!(*change, i64::from(*after) - i64::from(*before));
                    }
                }
            }
        }
    }
}

#[test]
fn test_modified_scenario_reports_loc_delta() {
    let base = Inventory::from_records(vec![rec("a.ts", "foo", 1, "h1", 10)]);
    let target = Inventory::from_records(vec![rec("a.ts", "foo", 1, "h2", 12)]);

    let result = diff(&base, &target);

    assert!(result.added.is_empty());
    assert!(result.removed.is_empty());
    assert_eq!(result.modified.len(), 1);
    assert_eq!(
        result.modified[0].metrics_changes.get("linesOfCode"),
        Some(&MetricChange::Numeric { before: 10, after: 12, change: 2 })
    );

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["modified"][0]["metricsChanges"]["linesOfCode"]["change"], 2);
}

#[test]
fn test_gate_flags_only_current_side() {
    let base = Inventory::from_records(vec![rec("a.ts", "big", 1, "h1", 200)]);
    let target = Inventory::from_records(vec![rec("a.ts", "big", 1, "h2", 30), rec("a.ts", "new", 300, "h3", 80)]);

    let violations = gate(&diff(&base, &target), &Thresholds::default(), 1.5);

    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].identifier, "new");
}

fn git_available() -> bool {
    Command::new("git").arg("--version").output().map(|o| o.status.success()).unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com", "-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
        .status;
    assert!(status.success(), "git {:?} failed", args);
}

#[test]
fn test_diff_between_git_revisions() {
    if !git_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let store = InventoryStore::new(root.join("backups"));
    let inventory_path = root.join("functions.jsonl");

    git(root, &["init", "-q"]);
    git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    store
        .save(&inventory_path, &Inventory::from_records(vec![rec("a.ts", "foo", 1, "h1", 10)]))
        .unwrap();
    git(root, &["add", "functions.jsonl"]);
    git(root, &["commit", "-q", "-m", "base"]);
    git(root, &["tag", "base"]);

    store
        .save(
            &inventory_path,
            &Inventory::from_records(vec![rec("a.ts", "foo", 1, "h2", 12), rec("a.ts", "bar", 30, "h3", 4)]),
        )
        .unwrap();
    fs::write(root.join("a.ts"), "export function bar() {}\n").unwrap();
    git(root, &["add", "functions.jsonl", "a.ts"]);
    git(root, &["commit", "-q", "-m", "target"]);

    let provider = GitRevisionProvider::new(root, "functions.jsonl").unwrap();

    let result = diff_revisions(&provider, "base", "HEAD").unwrap();
    assert_eq!(result.added.len(), 1);
    assert_eq!(result.modified.len(), 1);
    assert!(result.removed.is_empty());

    assert_eq!(provider.current_branch().unwrap(), "main");
    assert_eq!(provider.current_commit().unwrap().len(), 40);
    assert!(provider.parent_commit().unwrap().is_some());

    let changed = provider.changed_files("base").unwrap();
    assert!(changed.iter().any(|f| f.path == "a.ts" && f.status == ChangeStatus::Added));
    assert!(changed.iter().any(|f| f.path == "functions.jsonl" && f.status == ChangeStatus::Modified));

    assert!(provider.resolve_ref("no-such-ref").is_err());
}

#[test]
fn test_resolve_ref_from_repository_subdirectory() {
    if !git_available() {
        return;
    }

    let dir = TempDir::new().unwrap();
    let repo = dir.path();
    let project = repo.join("svc");
    fs::create_dir_all(&project).unwrap();
    let store = InventoryStore::new(project.join("backups"));

    git(repo, &["init", "-q"]);
    store
        .save(
            &project.join("functions.jsonl"),
            &Inventory::from_records(vec![rec("a.ts", "foo", 1, "h1", 10)]),
        )
        .unwrap();
    git(repo, &["add", "svc/functions.jsonl"]);
    git(repo, &["commit", "-q", "-m", "base"]);

    let provider = GitRevisionProvider::new(&project, "functions.jsonl").unwrap();
    assert_eq!(provider.resolve_ref("HEAD").unwrap().len(), 1);

    let missing = GitRevisionProvider::new(&project, "other.jsonl").unwrap();
    assert!(missing.resolve_ref("HEAD").unwrap().is_empty());
}
