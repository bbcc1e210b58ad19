// 🗂️ Ledger Index - existing ledger rows bucketed by canonical id

use crate::cell::Cell;
use crate::config::LedgerLayout;
use crate::identifier::{CanonicalId, IdNormalizer};
use crate::table::Table;
use std::collections::HashMap;
use tracing::info;

/// One existing ledger row as seen at scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    /// Index into `Table::rows` (0-based, header excluded)
    pub position: usize,
    pub id: CanonicalId,
    pub sequence: Cell,
    pub annotation: Cell,
    /// Row cells from the first payload column onward
    pub payload: Vec<Cell>,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerIndex {
    order: Vec<CanonicalId>,
    buckets: HashMap<CanonicalId, Vec<LedgerRow>>,
    /// Largest numeric sequence number seen; diagnostics only
    pub max_sequence: Option<f64>,
    pub rows_scanned: usize,
    /// Rows whose id column did not canonicalize
    pub rows_without_id: usize,
}

impl LedgerIndex {
    /// Scan the ledger rows once, in physical order.
    pub fn build(table: &Table, layout: &LedgerLayout, normalizer: &IdNormalizer) -> LedgerIndex {
        let mut index = LedgerIndex::default();

        for (position, row) in table.rows.iter().enumerate() {
            index.rows_scanned += 1;

            let sequence = row.get(layout.sequence).cloned().unwrap_or_default();
            if let Some(n) = sequence.as_f64() {
                if index.max_sequence.map_or(true, |max| n > max) {
                    index.max_sequence = Some(n);
                }
            }

            let raw_id = row.get(layout.id).map(Cell::to_field).unwrap_or_default();
            let id = match normalizer.canonical(&raw_id) {
                Some(id) => id,
                None => {
                    index.rows_without_id += 1;
                    continue;
                }
            };

            let entry = LedgerRow {
                position,
                id: id.clone(),
                sequence,
                annotation: row.get(layout.annotation).cloned().unwrap_or_default(),
                payload: row.iter().skip(layout.payload).cloned().collect(),
            };

            match index.buckets.get_mut(&id) {
                Some(rows) => rows.push(entry),
                None => {
                    index.order.push(id.clone());
                    index.buckets.insert(id, vec![entry]);
                }
            }
        }

        info!(
            rows = index.rows_scanned,
            ids = index.order.len(),
            max_sequence = ?index.max_sequence,
            "indexed ledger"
        );
        index
    }

    pub fn get(&self, id: &CanonicalId) -> Option<&[LedgerRow]> {
        self.buckets.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &CanonicalId) -> bool {
        self.buckets.contains_key(id)
    }

    /// Ids in order of their first physical row
    pub fn ids(&self) -> impl Iterator<Item = &CanonicalId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_buckets_rows_by_id_in_physical_order() {
        let table = ledger(
            "id,seq,note,d,e\n\
             1111222233334444,1,ok,a,b\n\
             5555666677778888,2,,c,d\n\
             1111222233334444,1,dup,e,f\n",
        );
        let index = LedgerIndex::build(&table, &LedgerLayout::default(), &IdNormalizer::primary());

        let id = IdNormalizer::primary().canonical("1111222233334444").unwrap();
        let rows = index.get(&id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].position, 0);
        assert_eq!(rows[1].position, 2);
        assert_eq!(rows[0].annotation, Cell::text("ok"));
        assert_eq!(rows[1].payload, vec![Cell::text("e"), Cell::text("f")]);

        let ids: Vec<&str> = index.ids().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["1111222233334444", "5555666677778888"]);
    }

    #[test]
    fn test_tracks_max_sequence_including_rows_without_id() {
        let table = ledger(
            "id,seq,note\n\
             1111222233334444,7,ok\n\
             bad,12.5,\n\
             5555666677778888,n/a,\n",
        );
        let index = LedgerIndex::build(&table, &LedgerLayout::default(), &IdNormalizer::primary());

        assert_eq!(index.max_sequence, Some(12.5));
        assert_eq!(index.rows_without_id, 1);
        assert_eq!(index.rows_scanned, 3);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_short_rows_get_empty_metadata() {
        let table = ledger("id\n1111222233334444\n");
        let index = LedgerIndex::build(&table, &LedgerLayout::default(), &IdNormalizer::primary());

        let id = IdNormalizer::primary().canonical("1111222233334444").unwrap();
        let row = &index.get(&id).unwrap()[0];
        assert_eq!(row.sequence, Cell::Empty);
        assert!(row.payload.is_empty());
        assert_eq!(index.max_sequence, None);
    }
}
