mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use func_tracker::TrackerContext;

use crate::cli::{Cli, Commands, Outcome};

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "func_tracker=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let ctx = TrackerContext::load(&cli.root)?;
    let format = cli.format;

    let outcome = match cli.command {
        Commands::Reconcile {
            scan,
            inventory,
            no_backup,
            dry_run,
        } => cli::reconcile(&ctx, format, &scan, inventory, no_backup, dry_run)?,
        Commands::Validate { path } => cli::validate(&ctx, format, path)?,
        Commands::Repair { path } => cli::repair(&ctx, format, path)?,
        Commands::Backup { paths } => cli::backup(&ctx, format, paths)?,
        Commands::Restore { id } => cli::restore(&ctx, format, &id)?,
        Commands::Backups => cli::list_backups(&ctx, format)?,
        Commands::Collect {
            inventory,
            commit,
            branch,
            parent,
            pr,
            timestamp,
        } => cli::collect_metrics(&ctx, format, inventory, commit, branch, parent, pr, timestamp)?,
        Commands::History {
            function,
            commit,
            pr,
            from,
            to,
            limit,
        } => cli::history(&ctx, format, function, commit, pr, from, to, limit)?,
        Commands::Violations { min_risk } => cli::violations(&ctx, format, min_risk)?,
        Commands::Diff {
            base,
            target,
            files,
            fail_on_violation,
        } => cli::diff_inventories(&ctx, format, &base, target.as_deref(), files, fail_on_violation)?,
        Commands::Prune { days } => cli::prune(&ctx, format, days)?,
        Commands::Stats => cli::stats(&ctx, format)?,
    };

    Ok(match outcome {
        Outcome::Success => ExitCode::SUCCESS,
        Outcome::GateFailed => ExitCode::FAILURE,
    })
}
