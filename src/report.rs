// 📊 Run Report - what a merge run did, for operators and for the journal

use crate::aggregate::{RejectedRow, SkippedBatch};
use crate::engine::{IdOutcome, MergeStats, Unmatched};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ledger: PathBuf,
    pub dry_run: bool,

    // Sources
    pub files_read: usize,
    pub skipped_batches: Vec<SkippedBatch>,
    pub source_rows: usize,
    pub rejected_rows: Vec<RejectedRow>,
    /// Distinct valid ids across all batches
    pub source_ids: usize,

    // Ledger
    pub ledger_rows: usize,
    pub ledger_ids: usize,
    pub max_sequence: Option<f64>,

    // Merge
    pub stats: MergeStats,
    pub per_id: Vec<IdOutcome>,
    pub unmatched: Vec<Unmatched>,

    // Persistence
    pub backup: Option<PathBuf>,
    pub written: bool,
}

impl RunReport {
    pub fn new(run_id: String, started_at: DateTime<Utc>, ledger: PathBuf, dry_run: bool) -> Self {
        RunReport {
            run_id,
            started_at,
            ledger,
            dry_run,
            files_read: 0,
            skipped_batches: Vec::new(),
            source_rows: 0,
            rejected_rows: Vec::new(),
            source_ids: 0,
            ledger_rows: 0,
            ledger_ids: 0,
            max_sequence: None,
            stats: MergeStats::default(),
            per_id: Vec::new(),
            unmatched: Vec::new(),
            backup: None,
            written: false,
        }
    }

    /// Total source occurrences that were never merged
    pub fn unmatched_occurrences(&self) -> usize {
        self.unmatched.iter().map(|u| u.occurrences).sum()
    }

    /// Ids present in sources but absent from the ledger, one per line.
    pub fn unmatched_listing(&self) -> String {
        self.unmatched
            .iter()
            .map(|u| format!("- {} (appears {} time(s) in the sources)\n", u.id, u.occurrences))
            .collect()
    }

    /// Console summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.write_summary(&mut out);
        out
    }

    fn write_summary(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "=== MERGE SUMMARY ({}) ===", self.run_id)?;
        writeln!(out, "Files read:               {}", self.files_read)?;
        writeln!(out, "Source rows:              {}", self.source_rows)?;
        writeln!(out, "Rows without a valid id:  {}", self.rejected_rows.len())?;
        writeln!(out, "Valid ids in sources:     {}", self.source_ids)?;
        writeln!(out, "Ids in ledger:            {}", self.ledger_ids)?;
        if let Some(max) = self.max_sequence {
            writeln!(out, "Highest sequence number:  {}", max)?;
        }
        writeln!(out, "Rows updated:             {}", self.stats.rows_updated)?;
        writeln!(out, "Rows inserted:            {}", self.stats.rows_inserted)?;
        writeln!(out, "Duplicates discarded:     {}", self.stats.duplicates_discarded)?;

        if !self.unmatched.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "{} id(s) found in sources but NOT in the ledger (not processed):",
                self.unmatched.len()
            )?;
            out.push_str(&self.unmatched_listing());
        }

        if !self.skipped_batches.is_empty() {
            writeln!(out)?;
            writeln!(out, "Files not processed: {}", self.skipped_batches.len())?;
            for skipped in &self.skipped_batches {
                writeln!(out, "- {}: {}", skipped.name, skipped.reason)?;
            }
        }

        writeln!(out)?;
        if !self.stats.changed() {
            writeln!(out, "No changes required in the ledger")?;
        } else if self.dry_run {
            writeln!(out, "Dry run: ledger left untouched")?;
        } else if self.written {
            if let Some(backup) = &self.backup {
                writeln!(out, "Backup created at: {}", backup.display())?;
            }
            writeln!(out, "Ledger written: {}", self.ledger.display())?;
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize run report")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report: {}", path.display()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
