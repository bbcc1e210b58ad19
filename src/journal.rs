// 📒 Run Journal - SQLite audit trail of merge runs
// "Every change is an event": one row per run, one event per decision.

use crate::engine::MergeDecision;
use crate::report::RunReport;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Recorded run, as listed by `history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub ledger: String,
    pub dry_run: bool,
    pub files_read: i64,
    pub rows_updated: i64,
    pub rows_inserted: i64,
    pub duplicates_discarded: i64,
    pub unmatched_ids: i64,
    pub backup: Option<String>,
    pub written: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeEvent {
    pub event_id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    /// updated | inserted | duplicate | unmatched
    pub event_type: String,
    pub canonical_id: String,
    pub data: serde_json::Value,
}

pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open journal: {}", path.display()))?;
    setup_journal(&conn)?;
    Ok(conn)
}

pub fn setup_journal(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at TEXT NOT NULL,
            ledger TEXT NOT NULL,
            dry_run INTEGER NOT NULL,
            files_read INTEGER NOT NULL,
            rows_updated INTEGER NOT NULL,
            rows_inserted INTEGER NOT NULL,
            duplicates_discarded INTEGER NOT NULL,
            unmatched_ids INTEGER NOT NULL,
            backup TEXT,
            written INTEGER NOT NULL,
            report TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS merge_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            run_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            canonical_id TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_run ON merge_events(run_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_canonical_id ON merge_events(canonical_id)",
        [],
    )?;

    Ok(())
}

fn decision_event(decision: &MergeDecision) -> (&'static str, String) {
    match decision {
        MergeDecision::Updated { id, .. } => ("updated", id.to_string()),
        MergeDecision::Inserted { id, .. } => ("inserted", id.to_string()),
        MergeDecision::DuplicateDiscarded { id, .. } => ("duplicate", id.to_string()),
    }
}

/// Store a run and all of its decisions in one transaction. Returns the event count.
pub fn record_run(
    conn: &mut Connection,
    report: &RunReport,
    decisions: &[MergeDecision],
) -> Result<usize> {
    let tx = conn.transaction()?;
    let timestamp = report.started_at.to_rfc3339();

    tx.execute(
        "INSERT INTO runs (
            run_id, started_at, ledger, dry_run, files_read, rows_updated, rows_inserted,
            duplicates_discarded, unmatched_ids, backup, written, report
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            report.run_id,
            timestamp,
            report.ledger.display().to_string(),
            report.dry_run,
            report.files_read as i64,
            report.stats.rows_updated as i64,
            report.stats.rows_inserted as i64,
            report.stats.duplicates_discarded as i64,
            report.unmatched.len() as i64,
            report.backup.as_ref().map(|p| p.display().to_string()),
            report.written,
            report.to_json()?,
        ],
    )?;

    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO merge_events (
                event_id, run_id, timestamp, event_type, canonical_id, data
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for decision in decisions {
            let (event_type, canonical_id) = decision_event(decision);
            stmt.execute(params![
                uuid::Uuid::new_v4().to_string(),
                report.run_id,
                timestamp,
                event_type,
                canonical_id,
                serde_json::to_string(decision)?,
            ])?;
            count += 1;
        }

        for unmatched in &report.unmatched {
            stmt.execute(params![
                uuid::Uuid::new_v4().to_string(),
                report.run_id,
                timestamp,
                "unmatched",
                unmatched.id.to_string(),
                serde_json::to_string(unmatched)?,
            ])?;
            count += 1;
        }
    }

    tx.commit()?;
    Ok(count)
}

/// Most recent runs first
pub fn list_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, ledger, dry_run, files_read, rows_updated, rows_inserted,
                duplicates_discarded, unmatched_ids, backup, written
         FROM runs
         ORDER BY started_at DESC, id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map(params![limit as i64], |row| {
            let started_at: String = row.get(1)?;
            Ok(RunRecord {
                run_id: row.get(0)?,
                started_at: DateTime::parse_from_rfc3339(&started_at)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                ledger: row.get(2)?,
                dry_run: row.get(3)?,
                files_read: row.get(4)?,
                rows_updated: row.get(5)?,
                rows_inserted: row.get(6)?,
                duplicates_discarded: row.get(7)?,
                unmatched_ids: row.get(8)?,
                backup: row.get(9)?,
                written: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

/// Every event ever recorded for one canonical id, oldest first
pub fn events_for_id(conn: &Connection, canonical_id: &str) -> Result<Vec<MergeEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, run_id, timestamp, event_type, canonical_id, data
         FROM merge_events
         WHERE canonical_id = ?1
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![canonical_id], |row| {
            let timestamp: String = row.get(2)?;
            let data: String = row.get(5)?;
            Ok(MergeEvent {
                event_id: row.get(0)?,
                run_id: row.get(1)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(3)?,
                canonical_id: row.get(4)?,
                data: serde_json::from_str(&data).map_err(|_| rusqlite::Error::InvalidQuery)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Provenance;
    use crate::engine::Unmatched;
    use crate::identifier::IdNormalizer;
    use std::path::PathBuf;

    fn report(run_id: &str) -> RunReport {
        let mut r = RunReport::new(run_id.to_string(), Utc::now(), PathBuf::from("ledger.csv"), false);
        r.stats.rows_updated = 1;
        r.stats.duplicates_discarded = 1;
        r.written = true;
        r.unmatched.push(Unmatched {
            id: IdNormalizer::primary().canonical("9999999999999999").unwrap(),
            occurrences: 2,
        });
        r
    }

    fn decisions() -> Vec<MergeDecision> {
        let id = IdNormalizer::primary().canonical("1234567890123456").unwrap();
        let source = Provenance {
            batch: "a.csv".to_string(),
            line: 2,
        };
        vec![
            MergeDecision::Updated {
                id: id.clone(),
                position: 0,
                source: source.clone(),
            },
            MergeDecision::DuplicateDiscarded {
                id,
                source,
                fingerprint: "abc".to_string(),
            },
        ]
    }

    #[test]
    fn test_record_and_list_runs() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_journal(&conn).unwrap();

        let count = record_run(&mut conn, &report("run-1"), &decisions()).unwrap();
        assert_eq!(count, 3);

        let runs = list_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "run-1");
        assert_eq!(runs[0].rows_updated, 1);
        assert_eq!(runs[0].unmatched_ids, 1);
        assert!(runs[0].written);
        assert_eq!(runs[0].backup, None);
    }

    #[test]
    fn test_events_for_id() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_journal(&conn).unwrap();
        record_run(&mut conn, &report("run-1"), &decisions()).unwrap();

        let events = events_for_id(&conn, "1234567890123456").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "updated");
        assert_eq!(events[1].event_type, "duplicate");
        assert_eq!(events[1].data["fingerprint"], "abc");

        let unmatched = events_for_id(&conn, "9999999999999999").unwrap();
        assert_eq!(unmatched[0].event_type, "unmatched");
        assert_eq!(unmatched[0].data["occurrences"], 2);
    }

    #[test]
    fn test_duplicate_run_id_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_journal(&conn).unwrap();
        record_run(&mut conn, &report("run-1"), &[]).unwrap();

        assert!(record_run(&mut conn, &report("run-1"), &[]).is_err());
        assert_eq!(list_runs(&conn, 10).unwrap().len(), 1);
    }
}
