pub mod batch;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod git;
pub mod history;
pub mod inventory;
pub mod quality;
pub mod reconcile;

pub use batch::{BatchFailure, BatchReport};
pub use config::{TrackerConfig, CONFIG_FILENAME};
pub use context::TrackerContext;
pub use diff::{diff, diff_revisions, gate, DiffResult, GateViolation, MetricChange, ModifiedFunction};
pub use error::{LineError, LineErrorKind, Result, TrackerError};
pub use git::{ChangeStatus, ChangedFile, GitRevisionProvider, RevisionProvider};
pub use history::{
    apply_retention, collect, ChangePolicy, ChangeType, CommitContext, MetricsHistory,
    MetricsSnapshot, SqliteHistory, Trend, ViolationAnalysis,
};
pub use inventory::{
    Backup, FunctionMetrics, FunctionRecord, IdentityKey, Inventory, InventoryStore, Metric,
};
pub use quality::{MetricViolation, RiskLevel, Severity, Thresholds};
pub use reconcile::{
    reconcile, JsonlScanner, ReconcileResult, Reconciler, ScanOutcome, SourceScanner,
    UpdateOptions,
};
