use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ledger_merge::{journal, pipeline, IdNormalizer, MergeConfig, MergeError, RunOptions};

#[derive(Parser)]
#[command(name = "ledger-merge", version, about = "Merge source transaction batches into the master ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every source batch against the master ledger
    Merge {
        /// TOML config file (all keys optional)
        #[arg(long, short = 'c', env = "LEDGER_MERGE_CONFIG")]
        config: Option<PathBuf>,

        /// Directory holding the source batches
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Master ledger CSV
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// SQLite run journal
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Compute everything, leave the ledger untouched
        #[arg(long)]
        dry_run: bool,

        /// Also write the run report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// List recorded runs from the journal
    History {
        #[arg(long)]
        journal: PathBuf,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Show every recorded decision for one id instead of the run list
        #[arg(long)]
        id: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ledger_merge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Merge {
            config,
            sources,
            ledger,
            journal,
            dry_run,
            report_json,
        } => run_merge(config, sources, ledger, journal, dry_run, report_json),
        Commands::History { journal, limit, id } => match id {
            Some(id) => run_id_history(journal, &id),
            None => run_history(journal, limit),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<MergeError>() {
            Some(e) if e.is_early_stop() => {
                println!("{}", e);
                ExitCode::SUCCESS
            }
            _ => {
                eprintln!("❌ {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

fn run_merge(
    config_path: Option<PathBuf>,
    sources: Option<PathBuf>,
    ledger: Option<PathBuf>,
    journal: Option<PathBuf>,
    dry_run: bool,
    report_json: Option<PathBuf>,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => MergeConfig::load(path)?,
        None => MergeConfig::default(),
    };

    // CLI flags win over the file
    if let Some(dir) = sources {
        config.sources.dir = dir;
    }
    if let Some(path) = ledger {
        config.ledger.path = path;
    }
    if journal.is_some() {
        config.journal.path = journal;
    }
    config.validate()?;

    let result = pipeline::run(&config, &RunOptions { dry_run })?;

    println!("{}", result.report.summary());

    if let Some(path) = report_json {
        result.report.write_json(&path)?;
        println!("📄 Report written to {}", path.display());
    }

    Ok(())
}

fn open_journal(journal_path: &Path) -> Result<rusqlite::Connection> {
    if !journal_path.exists() {
        anyhow::bail!("journal not found: {}", journal_path.display());
    }
    journal::open(journal_path)
        .with_context(|| format!("Failed to open journal {}", journal_path.display()))
}

fn run_history(journal_path: PathBuf, limit: usize) -> Result<()> {
    let conn = open_journal(&journal_path)?;
    let runs = journal::list_runs(&conn, limit)?;

    if runs.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:>7}  {:>8}  {:>10}  {:>9}  {}",
        "RUN", "STARTED", "UPDATED", "INSERTED", "DUPLICATES", "UNMATCHED", "STATUS"
    );
    for run in runs {
        let status = if run.dry_run {
            "dry-run"
        } else if run.written {
            "written"
        } else {
            "unchanged"
        };
        println!(
            "{:<36}  {:<20}  {:>7}  {:>8}  {:>10}  {:>9}  {}",
            run.run_id,
            run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            run.rows_updated,
            run.rows_inserted,
            run.duplicates_discarded,
            run.unmatched_ids,
            status
        );
    }

    Ok(())
}

fn run_id_history(journal_path: PathBuf, raw_id: &str) -> Result<()> {
    let id = IdNormalizer::primary()
        .normalize(raw_id)
        .map_err(|e| anyhow::anyhow!("invalid id {:?}: {}", raw_id, e))?;
    let conn = open_journal(&journal_path)?;
    let events = journal::events_for_id(&conn, id.as_str())?;

    if events.is_empty() {
        println!("No events recorded for {}", id);
        return Ok(());
    }

    println!("{:<20}  {:<36}  {:<10}  {}", "TIMESTAMP", "RUN", "EVENT", "DATA");
    for event in events {
        println!(
            "{:<20}  {:<36}  {:<10}  {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            event.run_id,
            event.event_type,
            event.data
        );
    }

    Ok(())
}
