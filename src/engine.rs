// ⚖️ Reconciliation Engine - update / insert / dedup against the master ledger
//
// For every id present in both the ledger and the sources:
//   1. Update: the first ledger row for the id takes the payload of the first
//      unconsumed source record. Always, even if nothing changed.
//   2. Dedup: every other unconsumed source record is fingerprinted. Known
//      fingerprints are discarded; new ones are accepted and become known.
//   3. Insert: accepted records become new rows right after the id's last
//      existing row, carrying the updated row's sequence number and annotation.
//
// The new ledger is materialized in one pass over the original physical order,
// so an insertion for one id never shifts positions recorded for another.

use crate::aggregate::{Provenance, SourceBucket};
use crate::cell::Cell;
use crate::config::LedgerLayout;
use crate::fingerprint::{Fingerprint, SignatureComputer};
use crate::identifier::CanonicalId;
use crate::index::{LedgerIndex, LedgerRow};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeDecision {
    Updated {
        id: CanonicalId,
        /// Row index in the ledger as read
        position: usize,
        source: Provenance,
    },
    Inserted {
        id: CanonicalId,
        /// Inserted after this row index of the ledger as read
        after_position: usize,
        source: Provenance,
        fingerprint: String,
    },
    DuplicateDiscarded {
        id: CanonicalId,
        source: Provenance,
        fingerprint: String,
    },
}

/// What happened to one matched id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdOutcome {
    pub id: CanonicalId,
    pub updated_position: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Source id with no ledger row. Never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unmatched {
    pub id: CanonicalId,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub rows_updated: usize,
    pub rows_inserted: usize,
    pub duplicates_discarded: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.rows_updated > 0 || self.rows_inserted > 0
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// New ledger state, ready to persist
    pub ledger: Table,
    pub stats: MergeStats,
    pub per_id: Vec<IdOutcome>,
    pub decisions: Vec<MergeDecision>,
    /// Sorted by id
    pub unmatched: Vec<Unmatched>,
    /// Source records with their final consumed flags
    pub sources: SourceBucket,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    layout: LedgerLayout,
    signature: SignatureComputer,
}

impl ReconciliationEngine {
    pub fn new(layout: LedgerLayout, signature: SignatureComputer) -> Self {
        ReconciliationEngine { layout, signature }
    }

    /// Merge `sources` into `ledger`. `index` must have been built from `ledger`.
    pub fn reconcile(
        &self,
        ledger: &Table,
        index: &LedgerIndex,
        mut sources: SourceBucket,
    ) -> MergeOutcome {
        let width = ledger.width();

        let mut updates: HashMap<usize, Vec<Cell>> = HashMap::new();
        let mut insertions: HashMap<usize, Vec<Vec<Cell>>> = HashMap::new();
        let mut stats = MergeStats::default();
        let mut per_id = Vec::new();
        let mut decisions = Vec::new();

        for id in index.ids() {
            let Some(records) = sources.get_mut(id) else {
                continue;
            };
            let rows = match index.get(id) {
                Some(rows) if !rows.is_empty() => rows,
                _ => continue,
            };
            let Some(first_open) = records.iter().position(|r| !r.consumed) else {
                continue;
            };

            // 1. update
            let anchor = &rows[0];
            let mut updated = ledger.rows[anchor.position].clone();
            self.write_payload(&mut updated, &records[first_open].payload);
            records[first_open].consumed = true;

            let updated_fp = self.signature.compute(self.comparable(&updated));
            debug!(%id, position = anchor.position, "updated ledger row");
            decisions.push(MergeDecision::Updated {
                id: id.clone(),
                position: anchor.position,
                source: records[first_open].provenance.clone(),
            });
            stats.rows_updated += 1;
            updates.insert(anchor.position, updated);

            let mut outcome = IdOutcome {
                id: id.clone(),
                updated_position: anchor.position,
                inserted: 0,
                duplicates: 0,
            };

            // 2. dedup
            if records.len() > 1 {
                let mut known = self.existing_fingerprints(rows);
                known.insert(updated_fp);

                let last_position = rows.iter().map(|r| r.position).max().unwrap_or(anchor.position);
                let mut accepted = Vec::new();

                for record in records.iter_mut().filter(|r| !r.consumed) {
                    let candidate = self.candidate_row(id, anchor, &record.payload, width);
                    let fp = self.signature.compute(self.comparable(&candidate));
                    record.consumed = true;

                    if known.contains(&fp) {
                        debug!(%id, batch = %record.provenance.batch, line = record.provenance.line, "duplicate discarded");
                        decisions.push(MergeDecision::DuplicateDiscarded {
                            id: id.clone(),
                            source: record.provenance.clone(),
                            fingerprint: fp.digest(),
                        });
                        outcome.duplicates += 1;
                    } else {
                        decisions.push(MergeDecision::Inserted {
                            id: id.clone(),
                            after_position: last_position,
                            source: record.provenance.clone(),
                            fingerprint: fp.digest(),
                        });
                        known.insert(fp);
                        accepted.push(candidate);
                        outcome.inserted += 1;
                    }
                }

                if !accepted.is_empty() {
                    debug!(%id, count = accepted.len(), after = last_position, "rows accepted for insertion");
                    insertions.insert(last_position, accepted);
                }
            }

            stats.rows_inserted += outcome.inserted;
            stats.duplicates_discarded += outcome.duplicates;
            per_id.push(outcome);
        }

        // 3. materialize
        let mut rows = Vec::with_capacity(ledger.rows.len() + stats.rows_inserted);
        for (position, row) in ledger.rows.iter().enumerate() {
            rows.push(updates.remove(&position).unwrap_or_else(|| row.clone()));
            if let Some(extra) = insertions.remove(&position) {
                rows.extend(extra);
            }
        }

        let mut unmatched: Vec<Unmatched> = sources
            .ids()
            .filter(|id| !index.contains(id))
            .map(|id| Unmatched {
                id: id.clone(),
                occurrences: sources.occurrences(id),
            })
            .collect();
        unmatched.sort_by(|a, b| a.id.cmp(&b.id));

        info!(
            updated = stats.rows_updated,
            inserted = stats.rows_inserted,
            duplicates = stats.duplicates_discarded,
            unmatched = unmatched.len(),
            "reconciliation finished"
        );

        MergeOutcome {
            ledger: Table::new(ledger.header.clone(), rows),
            stats,
            per_id,
            decisions,
            unmatched,
            sources,
        }
    }

    /// Overwrite from the target column on, applying number formatting.
    fn write_payload(&self, row: &mut Vec<Cell>, payload: &[Cell]) {
        let end = self.layout.target + payload.len();
        if row.len() < end {
            row.resize(end, Cell::Empty);
        }
        for (offset, value) in payload.iter().enumerate() {
            row[self.layout.target + offset] = value.formatted();
        }
    }

    /// New row for `id`: same sequence number and annotation as `anchor`.
    fn candidate_row(
        &self,
        id: &CanonicalId,
        anchor: &LedgerRow,
        payload: &[Cell],
        width: usize,
    ) -> Vec<Cell> {
        let len = width
            .max(self.layout.target + payload.len())
            .max(self.layout.annotation + 1)
            .max(self.layout.id + 1);
        let mut row = vec![Cell::Empty; len];
        row[self.layout.id] = Cell::parse(id.as_str());
        row[self.layout.sequence] = anchor.sequence.clone();
        row[self.layout.annotation] = anchor.annotation.clone();
        self.write_payload(&mut row, payload);
        row
    }

    /// Slice of a full row that fingerprints are computed over.
    fn comparable<'a>(&self, row: &'a [Cell]) -> &'a [Cell] {
        row.get(self.layout.target..).unwrap_or(&[])
    }

    /// Fingerprints of the id's ledger rows as they were read.
    fn existing_fingerprints(&self, rows: &[LedgerRow]) -> HashSet<Fingerprint> {
        // LedgerRow::payload starts at the payload column, not the target column
        let skip = self.layout.target - self.layout.payload;
        rows.iter()
            .map(|r| self.signature.compute(r.payload.get(skip..).unwrap_or(&[])))
            .collect()
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(LedgerLayout::default(), SignatureComputer::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SourceRecord;
    use crate::identifier::IdNormalizer;

    const X: &str = "1234567890123456";
    const Y: &str = "2222333344445555";

    fn id(raw: &str) -> CanonicalId {
        IdNormalizer::primary().canonical(raw).unwrap()
    }

    /// 18-field payload; `key` sits at fingerprint offset 6, `note` at 0
    fn payload(key: &str, note: &str) -> Vec<Cell> {
        let mut p: Vec<Cell> = (0..18).map(|i| Cell::Int(i as i64)).collect();
        p[0] = Cell::text(note);
        p[6] = Cell::text(key);
        p
    }

    fn ledger_row(raw_id: &str, seq: i64, note: &str, key: &str) -> Vec<Cell> {
        let mut row = vec![
            Cell::parse(raw_id),
            Cell::Int(seq),
            Cell::text(note),
            Cell::text("d"),
            Cell::text("e"),
            Cell::text("f"),
            Cell::text("g"),
            Cell::text("h"),
        ];
        row.extend(payload(key, "ledger"));
        row
    }

    fn sources(records: &[(&str, Vec<Cell>)]) -> SourceBucket {
        let mut bucket = SourceBucket::default();
        for (line, (raw_id, p)) in records.iter().enumerate() {
            bucket.push(SourceRecord {
                id: id(raw_id),
                payload: p.clone(),
                provenance: Provenance {
                    batch: "batch.csv".to_string(),
                    line: line + 2,
                },
                consumed: false,
            });
        }
        bucket
    }

    fn run(ledger: &Table, bucket: SourceBucket) -> MergeOutcome {
        let engine = ReconciliationEngine::default();
        let index = LedgerIndex::build(ledger, &LedgerLayout::default(), &IdNormalizer::primary());
        engine.reconcile(ledger, &index, bucket)
    }

    fn key_at(row: &[Cell]) -> String {
        row[8 + 6].to_field()
    }

    #[test]
    fn test_update_duplicate_and_insert() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 7, "ok", "old")]);
        let bucket = sources(&[
            (X, payload("a", "A")),
            (X, payload("old", "B")),
            (X, payload("c", "C")),
        ]);

        let out = run(&ledger, bucket);

        assert_eq!(out.stats.rows_updated, 1);
        assert_eq!(out.stats.rows_inserted, 1);
        assert_eq!(out.stats.duplicates_discarded, 1);
        assert!(out.unmatched.is_empty());

        assert_eq!(out.ledger.rows.len(), 2);
        assert_eq!(key_at(&out.ledger.rows[0]), "a");
        assert_eq!(out.ledger.rows[0][8].to_field(), "A");
        // ledger-owned metadata and pre-target columns survive the update
        assert_eq!(out.ledger.rows[0][1], Cell::Int(7));
        assert_eq!(out.ledger.rows[0][3], Cell::text("d"));

        let inserted = &out.ledger.rows[1];
        assert_eq!(inserted[0].to_field(), X);
        assert_eq!(inserted[1], Cell::Int(7));
        assert_eq!(inserted[2], Cell::text("ok"));
        assert_eq!(key_at(inserted), "c");
        assert_eq!(inserted[3], Cell::Empty);
    }

    #[test]
    fn test_unmatched_ids_reported_not_merged() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "k")]);
        let bucket = sources(&[
            ("9999999999999999", payload("n", "")),
            ("9999999999999999", payload("m", "")),
        ]);

        let out = run(&ledger, bucket);

        assert_eq!(out.stats, MergeStats::default());
        assert!(!out.stats.changed());
        assert_eq!(out.ledger, ledger);
        assert_eq!(
            out.unmatched,
            vec![Unmatched {
                id: id("9999999999999999"),
                occurrences: 2
            }]
        );
    }

    #[test]
    fn test_update_is_unconditional() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "same")]);
        let out = run(&ledger, sources(&[(X, payload("same", "ledger"))]));

        assert_eq!(out.stats.rows_updated, 1);
        assert!(out.stats.changed());
        assert_eq!(out.ledger, ledger);
    }

    #[test]
    fn test_first_record_wins_update() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "old")]);
        let bucket = sources(&[
            (X, payload("first", "")),
            (X, payload("second", "")),
            (X, payload("third", "")),
        ]);

        let out = run(&ledger, bucket);

        assert_eq!(key_at(&out.ledger.rows[0]), "first");
        assert_eq!(key_at(&out.ledger.rows[1]), "second");
        assert_eq!(key_at(&out.ledger.rows[2]), "third");
        match &out.decisions[0] {
            MergeDecision::Updated { source, .. } => assert_eq!(source.line, 2),
            other => panic!("expected update first, got {:?}", other),
        }
    }

    #[test]
    fn test_resubmitted_update_record_is_duplicate() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "old")]);
        // same transaction delivered by two batches
        let bucket = sources(&[(X, payload("a", "first")), (X, payload("a", "again"))]);

        let out = run(&ledger, bucket);

        assert_eq!(out.stats.rows_inserted, 0);
        assert_eq!(out.stats.duplicates_discarded, 1);
        assert_eq!(out.ledger.rows.len(), 1);
    }

    #[test]
    fn test_duplicates_among_new_rows_caught() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "old")]);
        let bucket = sources(&[
            (X, payload("a", "")),
            (X, payload("b", "one")),
            (X, payload("b", "two")),
        ]);

        let out = run(&ledger, bucket);

        assert_eq!(out.stats.rows_inserted, 1);
        assert_eq!(out.stats.duplicates_discarded, 1);
        assert_eq!(out.per_id[0].duplicates, 1);
    }

    #[test]
    fn test_insertion_locality_across_ids() {
        // X occupies rows 0 and 2, Y rows 1 and 3
        let ledger = Table::new(
            vec![],
            vec![
                ledger_row(X, 1, "x", "x0"),
                ledger_row(Y, 2, "y", "y0"),
                ledger_row(X, 1, "x", "x1"),
                ledger_row(Y, 2, "y", "y1"),
            ],
        );
        let bucket = sources(&[
            (X, payload("xa", "")),
            (Y, payload("ya", "")),
            (X, payload("xb", "")),
            (Y, payload("yb", "")),
            (Y, payload("yc", "")),
        ]);

        let out = run(&ledger, bucket);
        let keys: Vec<String> = out.ledger.rows.iter().map(|r| key_at(r)).collect();

        assert_eq!(keys, vec!["xa", "ya", "x1", "xb", "y1", "yb", "yc"]);
        assert_eq!(out.ledger.rows[3][1], Cell::Int(1));
        assert_eq!(out.ledger.rows[5][2], Cell::text("y"));
        assert_eq!(out.ledger.rows[6][2], Cell::text("y"));
    }

    #[test]
    fn test_ledger_only_ids_untouched() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "k"), ledger_row(Y, 2, "", "k")]);
        let out = run(&ledger, sources(&[(Y, payload("new", ""))]));

        assert_eq!(out.ledger.rows[0], ledger.rows[0]);
        assert_eq!(key_at(&out.ledger.rows[1]), "new");
        assert_eq!(out.per_id.len(), 1);
    }

    #[test]
    fn test_all_matched_records_consumed() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "old")]);
        let bucket = sources(&[
            (X, payload("a", "")),
            (X, payload("old", "")),
            (X, payload("c", "")),
            ("9999999999999999", payload("z", "")),
        ]);

        let out = run(&ledger, bucket);

        assert!(out.sources.get(&id(X)).unwrap().iter().all(|r| r.consumed));
        assert!(out.sources.get(&id("9999999999999999")).unwrap().iter().all(|r| !r.consumed));
    }

    #[test]
    fn test_number_formatting_on_write() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 1, "", "old")]);
        let mut p = payload("a", "");
        p[1] = Cell::parse("250.0");
        p[2] = Cell::parse("19.9");
        let out = run(&ledger, sources(&[(X, p)]));

        assert_eq!(out.ledger.rows[0][9], Cell::Int(250));
        assert_eq!(out.ledger.rows[0][10].to_field(), "19.90");
    }

    #[test]
    fn test_idempotent_second_run() {
        let ledger = Table::new(vec![], vec![ledger_row(X, 3, "keep", "old")]);
        let records = [
            (X, payload("a", "")),
            (X, payload("a", "resent")),
            (X, payload("c", "")),
        ];

        let first = run(&ledger, sources(&records));
        assert_eq!(first.stats.rows_inserted, 1);

        let second = run(&first.ledger, sources(&records));
        assert_eq!(second.stats.rows_updated, 1);
        assert_eq!(second.stats.rows_inserted, 0);
        assert_eq!(second.stats.duplicates_discarded, 2);
        assert_eq!(second.ledger, first.ledger);
    }

    #[test]
    fn test_short_ledger_row_is_extended() {
        let ledger = Table::new(vec!["id".to_string()], vec![vec![Cell::parse(X)]]);
        let out = run(&ledger, sources(&[(X, payload("a", ""))]));

        assert_eq!(out.ledger.rows[0].len(), 8 + 18);
        assert_eq!(key_at(&out.ledger.rows[0]), "a");
    }
}
