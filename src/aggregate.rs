// 📥 Source Aggregator - every source record, bucketed by canonical id
//
// Order is load-bearing: batches in file-name order, rows in file order.
// The first record for an id is always the update candidate.

use crate::cell::Cell;
use crate::error::MergeError;
use crate::identifier::{CanonicalId, IdNormalizer, IdRejection};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// TYPES
// ============================================================================

/// One parsed source file: first column raw id, the rest payload.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub name: String,
    pub table: Table,
}

/// Where a source record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub batch: String,
    /// Line in the source file (header is line 1)
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: CanonicalId,
    pub payload: Vec<Cell>,
    pub provenance: Provenance,
    /// Flips to true once: updated with, inserted, or discarded as duplicate
    pub consumed: bool,
}

/// Row dropped because its id did not canonicalize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub batch: String,
    pub line: usize,
    pub raw: String,
    pub reason: IdRejection,
}

/// Source file left out of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedBatch {
    pub name: String,
    pub reason: String,
}

// ============================================================================
// SOURCE BUCKET
// ============================================================================

/// Canonical id → records in arrival order. Ids iterate in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SourceBucket {
    order: Vec<CanonicalId>,
    records: HashMap<CanonicalId, Vec<SourceRecord>>,
}

impl SourceBucket {
    pub fn push(&mut self, record: SourceRecord) {
        match self.records.get_mut(&record.id) {
            Some(list) => list.push(record),
            None => {
                self.order.push(record.id.clone());
                self.records.insert(record.id.clone(), vec![record]);
            }
        }
    }

    pub fn get(&self, id: &CanonicalId) -> Option<&[SourceRecord]> {
        self.records.get(id).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, id: &CanonicalId) -> Option<&mut Vec<SourceRecord>> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &CanonicalId) -> bool {
        self.records.contains_key(id)
    }

    /// Ids in first-seen order
    pub fn ids(&self) -> impl Iterator<Item = &CanonicalId> {
        self.order.iter()
    }

    pub fn occurrences(&self, id: &CanonicalId) -> usize {
        self.records.get(id).map_or(0, Vec::len)
    }

    /// Number of distinct ids
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub bucket: SourceBucket,
    pub rejected: Vec<RejectedRow>,
    pub rows_read: usize,
}

/// Bucket all rows of all batches, in the order given.
pub fn aggregate(batches: &[SourceBatch], normalizer: &IdNormalizer) -> Aggregation {
    let mut result = Aggregation::default();

    for batch in batches {
        for (idx, row) in batch.table.rows.iter().enumerate() {
            result.rows_read += 1;
            let line = idx + 2;
            let raw = row.first().map(Cell::to_field).unwrap_or_default();

            match normalizer.normalize(&raw) {
                Ok(id) => result.bucket.push(SourceRecord {
                    id,
                    payload: row.iter().skip(1).cloned().collect(),
                    provenance: Provenance {
                        batch: batch.name.clone(),
                        line,
                    },
                    consumed: false,
                }),
                Err(reason) => {
                    debug!(batch = %batch.name, line, %reason, "dropping source row");
                    result.rejected.push(RejectedRow {
                        batch: batch.name.clone(),
                        line,
                        raw,
                        reason,
                    });
                }
            }
        }
    }

    info!(
        rows = result.rows_read,
        ids = result.bucket.len(),
        rejected = result.rejected.len(),
        "aggregated source records"
    );
    result
}

// ============================================================================
// BATCH LOADING
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BatchLoad {
    pub batches: Vec<SourceBatch>,
    pub skipped: Vec<SkippedBatch>,
}

/// Check a batch before it joins the run: it needs columns and at least one
/// valid id in its first column. Returns the number of valid ids.
pub fn validate_batch(table: &Table, normalizer: &IdNormalizer) -> Result<usize, String> {
    if table.width() == 0 {
        return Err("no columns".to_string());
    }

    let valid = table
        .rows
        .iter()
        .filter(|row| {
            row.first()
                .map(|cell| normalizer.canonical(&cell.to_field()).is_some())
                .unwrap_or(false)
        })
        .count();

    if valid == 0 {
        return Err(format!(
            "no valid {}-digit ids in the first column",
            normalizer.length()
        ));
    }
    Ok(valid)
}

/// Read every source file in `dir` whose extension is listed, in file-name order.
/// Unparseable or invalid files are skipped, not fatal.
pub fn load_batches(
    dir: &Path,
    extensions: &[String],
    normalizer: &IdNormalizer,
) -> Result<BatchLoad, MergeError> {
    let unreadable = |e: std::io::Error| MergeError::SourceDirUnreadable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if path.is_file() && matches_ext {
            paths.push(path);
        }
    }
    paths.sort();

    let mut load = BatchLoad::default();
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let table = match Table::read(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(batch = %name, error = %format!("{:#}", e), "skipping unreadable batch");
                load.skipped.push(SkippedBatch {
                    name,
                    reason: format!("{:#}", e),
                });
                continue;
            }
        };

        match validate_batch(&table, normalizer) {
            Ok(valid) => {
                info!(
                    batch = %name,
                    rows = table.len(),
                    columns = table.width(),
                    valid_ids = valid,
                    "read source batch"
                );
                load.batches.push(SourceBatch { name, table });
            }
            Err(reason) => {
                warn!(batch = %name, %reason, "skipping source batch");
                load.skipped.push(SkippedBatch { name, reason });
            }
        }
    }

    Ok(load)
}

// ============================================================================
// TESTS
// ============================================================================
