// 📄 Tables - CSV ↔ rows of typed cells
// Both source batches and the master ledger travel through here.

use crate::cell::Cell;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::io::{Read, Write};
use std::path::Path;

/// Header row + data rows. Rows may be ragged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(header: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Table { header, rows }
    }

    /// Widest of header and rows
    pub fn width(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.header.len()))
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse CSV text: first record is the header.
    pub fn from_reader<R: Read>(reader: R) -> Result<Table> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = rdr.records();

        let header = match records.next() {
            Some(first) => first
                .context("Failed to parse CSV header")?
                .iter()
                .map(str::to_string)
                .collect(),
            None => return Ok(Table::default()),
        };

        let mut rows = Vec::new();
        for (line_num, result) in records.enumerate() {
            // +2: 1-indexed, plus the header row
            let record = result
                .with_context(|| format!("Failed to parse CSV line {}", line_num + 2))?;
            rows.push(record.iter().map(Cell::parse).collect());
        }

        Ok(Table { header, rows })
    }

    pub fn read(path: &Path) -> Result<Table> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        Table::from_reader(file).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Write as CSV, padding every row (and the header) to the table width.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let width = self.width();
        let mut wtr = WriterBuilder::new().flexible(false).from_writer(writer);

        let mut header = self.header.clone();
        header.resize(width, String::new());
        wtr.write_record(&header).context("Failed to write CSV header")?;

        for row in &self.rows {
            let mut fields: Vec<String> = row.iter().map(Cell::to_field).collect();
            fields.resize(width, String::new());
            wtr.write_record(&fields).context("Failed to write CSV row")?;
        }

        wtr.flush().context("Failed to flush CSV writer")?;
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {}", path.display()))?;
        self.to_writer(file)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_header_and_rows() {
        let csv = "id,amount,desc\n1234567890123456,10.50,Pago\n6543210987654321,3,\n";
        let table = Table::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(table.header, vec!["id", "amount", "desc"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][1], Cell::parse("10.50"));
        assert_eq!(table.rows[1][2], Cell::Empty);
    }

    #[test]
    fn test_ragged_rows_are_accepted() {
        let csv = "a,b\n1\n1,2,3\n";
        let table = Table::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.rows[0].len(), 1);
        assert_eq!(table.width(), 3);
    }

    #[test]
    fn test_write_pads_to_width() {
        let table = Table::new(
            vec!["a".to_string()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(2), Cell::text("x")]],
        );
        let mut out = Vec::new();
        table.to_writer(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,\n1,\n2,x\n");
    }

    #[test]
    fn test_empty_input() {
        let table = Table::from_reader("".as_bytes()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.width(), 0);
    }

    #[test]
    fn test_untouched_content_round_trips() {
        let csv = "id,seq,note,amount\n0001,7,ok,12.500\n";
        let table = Table::from_reader(csv.as_bytes()).unwrap();
        let mut out = Vec::new();
        table.to_writer(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), csv);
    }
}
