// 🔁 Merge Pipeline - one run end to end
//
//   sources dir ──► load_batches ──► aggregate ──┐
//                                                ├──► reconcile ──► persist ──► journal
//   ledger file ──► Table::read ──► LedgerIndex ─┘
//
// Every stage returns its result; nothing accumulates on shared state.

use crate::aggregate::{aggregate, load_batches};
use crate::config::MergeConfig;
use crate::engine::{MergeDecision, ReconciliationEngine};
use crate::error::MergeError;
use crate::index::LedgerIndex;
use crate::journal;
use crate::report::RunReport;
use crate::store;
use crate::table::Table;
use anyhow::Result;
use chrono::{Local, Utc};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Do everything except backup and write
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub report: RunReport,
    pub decisions: Vec<MergeDecision>,
    /// Ledger state after the merge (written unless dry run or unchanged)
    pub ledger: Table,
}

/// Run one reconciliation.
///
/// Missing ledger, unreadable sources dir, no valid batches and an empty
/// ledger come back as [`MergeError`] inside the `anyhow::Error`.
pub fn run(config: &MergeConfig, options: &RunOptions) -> Result<RunResult> {
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    let ledger_path = &config.ledger.path;

    if !ledger_path.exists() {
        return Err(MergeError::MissingLedgerFile(ledger_path.clone()).into());
    }

    let normalizer = config.normalizer();
    let layout = config.layout();

    info!(run_id = %run_id, sources = %config.sources.dir.display(), "starting merge run");

    // Sources
    let load = load_batches(&config.sources.dir, &config.sources.extensions, &normalizer)?;
    if load.batches.is_empty() {
        return Err(MergeError::EmptySourceSet.into());
    }
    let aggregation = aggregate(&load.batches, &normalizer);

    // Ledger
    let ledger = Table::read(ledger_path).map_err(|e| MergeError::Csv {
        path: ledger_path.clone(),
        reason: format!("{:#}", e),
    })?;
    if ledger.is_empty() {
        return Err(MergeError::EmptyLedger.into());
    }
    let index = LedgerIndex::build(&ledger, &layout, &normalizer);

    // A journal that cannot be opened must fail the run before the ledger changes
    let mut journal_conn = match &config.journal.path {
        Some(path) => Some((path, journal::open(path)?)),
        None => None,
    };

    let mut report = RunReport::new(run_id, started_at, ledger_path.clone(), options.dry_run);
    report.files_read = load.batches.len();
    report.skipped_batches = load.skipped;
    report.source_rows = aggregation.rows_read;
    report.rejected_rows = aggregation.rejected;
    report.source_ids = aggregation.bucket.len();
    report.ledger_rows = index.rows_scanned;
    report.ledger_ids = index.len();
    report.max_sequence = index.max_sequence;

    // Merge
    let engine = ReconciliationEngine::new(layout, config.signature());
    let outcome = engine.reconcile(&ledger, &index, aggregation.bucket);

    report.stats = outcome.stats;
    report.per_id = outcome.per_id;
    report.unmatched = outcome.unmatched;

    for u in &report.unmatched {
        warn!(id = %u.id, occurrences = u.occurrences, "id not found in ledger");
    }

    // Persist
    if outcome.stats.changed() && !options.dry_run {
        let at = Local::now().naive_local();
        let backup = store::persist(&outcome.ledger, ledger_path, &config.backup_dir(), at)?;
        report.backup = Some(backup);
        report.written = true;
    } else if !outcome.stats.changed() {
        info!("no changes required in the ledger");
    }

    if let Some((path, conn)) = journal_conn.as_mut() {
        match journal::record_run(conn, &report, &outcome.decisions) {
            Ok(events) => info!(journal = %path.display(), events, "run recorded"),
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(journal = %path.display(), error = %reason, "failed to record run");
            }
        }
    }

    Ok(RunResult {
        report,
        decisions: outcome.decisions,
        ledger: outcome.ledger,
    })
}
