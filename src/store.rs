// 💾 Ledger Writer - backup, then overwrite the master ledger

use crate::table::Table;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<stem>_backup_<YYYYMMDD_HHMMSS>.<ext>` inside `dir`.
pub fn backup_path(ledger: &Path, dir: &Path, at: NaiveDateTime) -> PathBuf {
    let stem = ledger
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ledger");
    let stamp = at.format("%Y%m%d_%H%M%S");
    let name = match ledger.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_backup_{stamp}.{ext}"),
        None => format!("{stem}_backup_{stamp}"),
    };
    dir.join(name)
}

/// Copy the ledger file as it is on disk right now.
pub fn write_backup(ledger: &Path, dir: &Path, at: NaiveDateTime) -> Result<PathBuf> {
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create backup directory: {}", dir.display()))?;
    }
    let target = backup_path(ledger, dir, at);
    std::fs::copy(ledger, &target).with_context(|| {
        format!("Failed to back up {} to {}", ledger.display(), target.display())
    })?;
    info!(backup = %target.display(), "backup created");
    Ok(target)
}

/// Back up the current ledger file, then replace it with `table`.
///
/// The new content goes to a sibling temp file first and is renamed over the
/// ledger. A failure after the backup leaves the old ledger in place next to
/// its backup.
pub fn persist(table: &Table, ledger: &Path, backup_dir: &Path, at: NaiveDateTime) -> Result<PathBuf> {
    let backup = write_backup(ledger, backup_dir, at)?;

    let mut tmp = ledger.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    table.write(&tmp)?;
    std::fs::rename(&tmp, ledger)
        .with_context(|| format!("Failed to replace ledger: {}", ledger.display()))?;

    info!(ledger = %ledger.display(), rows = table.len(), "ledger written");
    Ok(backup)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 30)
            .unwrap()
    }

    #[test]
    fn test_backup_name() {
        let path = backup_path(Path::new("out/CONCENTRADO.csv"), Path::new("out"), at());
        assert_eq!(path, PathBuf::from("out/CONCENTRADO_backup_20250309_140530.csv"));
    }

    #[test]
    fn test_persist_backs_up_old_content_then_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("ledger.csv");
        std::fs::write(&ledger, "id,seq\n1234567890123456,1\n").unwrap();

        let table = Table::new(
            vec!["id".to_string(), "seq".to_string()],
            vec![vec![Cell::parse("1234567890123456"), Cell::Int(2)]],
        );
        let backups = dir.path().join("backups");
        let backup = persist(&table, &ledger, &backups, at()).unwrap();

        assert_eq!(
            std::fs::read_to_string(&backup).unwrap(),
            "id,seq\n1234567890123456,1\n"
        );
        assert_eq!(
            std::fs::read_to_string(&ledger).unwrap(),
            "id,seq\n1234567890123456,2\n"
        );
        assert!(!dir.path().join("ledger.csv.tmp").exists());
    }

    #[test]
    fn test_missing_ledger_fails_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("missing.csv");
        let result = persist(&Table::default(), &ledger, dir.path(), at());

        assert!(result.is_err());
        assert!(!ledger.exists());
    }
}
