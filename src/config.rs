// ⚙️ Configuration - where the files live and how the ledger is laid out
//
// Every key is optional; an empty file yields the layout agreed with the
// upstream producers:
//
//   [sources]
//   dir = "REPORTE-ML"
//   extensions = ["csv"]
//
//   [ledger]
//   path = "RESULTADO-FINAL/CONCENTRADO.csv"
//   id_length = 16
//   id_column = 1            # 1-based, like the spreadsheet
//   sequence_column = 2
//   annotation_column = 3
//   payload_column = 4
//   target_column = 9
//
//   [fingerprint]
//   offsets = [6, 10, 11, 14, 17]
//
//   [backup]
//   dir = "backups"          # default: next to the ledger
//
//   [journal]
//   path = "merge-journal.db"

use crate::error::MergeError;
use crate::fingerprint::{SignatureComputer, DEFAULT_OFFSETS};
use crate::identifier::{IdNormalizer, PRIMARY_ID_LENGTH};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// FILE CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub sources: SourcesConfig,
    pub ledger: LedgerConfig,
    pub fingerprint: FingerprintConfig,
    pub backup: BackupConfig,
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub dir: PathBuf,
    pub extensions: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        SourcesConfig {
            dir: PathBuf::from("REPORTE-ML"),
            extensions: vec!["csv".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub id_length: usize,
    pub id_column: usize,
    pub sequence_column: usize,
    pub annotation_column: usize,
    pub payload_column: usize,
    pub target_column: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            path: PathBuf::from("RESULTADO-FINAL/CONCENTRADO.csv"),
            id_length: PRIMARY_ID_LENGTH,
            id_column: 1,
            sequence_column: 2,
            annotation_column: 3,
            payload_column: 4,
            target_column: 9,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FingerprintConfig {
    pub offsets: Vec<usize>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        FingerprintConfig {
            offsets: DEFAULT_OFFSETS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    pub path: Option<PathBuf>,
}

impl MergeConfig {
    pub fn from_toml(input: &str) -> Result<Self, MergeError> {
        let config: MergeConfig =
            toml::from_str(input).map_err(|e| MergeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, MergeError> {
        let text = std::fs::read_to_string(path).map_err(|e| MergeError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        let l = &self.ledger;
        if l.id_length == 0 {
            return Err(MergeError::Config("ledger.id_length must be > 0".into()));
        }
        if l.id_column == 0 {
            return Err(MergeError::Config("ledger columns are 1-based".into()));
        }
        if !(l.id_column < l.sequence_column
            && l.sequence_column < l.annotation_column
            && l.annotation_column < l.payload_column
            && l.payload_column <= l.target_column)
        {
            return Err(MergeError::Config(format!(
                "ledger columns must satisfy id < sequence < annotation < payload <= target \
                 (got {}, {}, {}, {}, {})",
                l.id_column, l.sequence_column, l.annotation_column, l.payload_column, l.target_column
            )));
        }
        if self.fingerprint.offsets.is_empty() {
            return Err(MergeError::Config("fingerprint.offsets must not be empty".into()));
        }
        if self.sources.extensions.is_empty() {
            return Err(MergeError::Config("sources.extensions must not be empty".into()));
        }
        Ok(())
    }

    pub fn layout(&self) -> LedgerLayout {
        let l = &self.ledger;
        LedgerLayout {
            id: l.id_column - 1,
            sequence: l.sequence_column - 1,
            annotation: l.annotation_column - 1,
            payload: l.payload_column - 1,
            target: l.target_column - 1,
        }
    }

    pub fn normalizer(&self) -> IdNormalizer {
        IdNormalizer::new(self.ledger.id_length)
    }

    pub fn signature(&self) -> SignatureComputer {
        SignatureComputer::new(self.fingerprint.offsets.clone())
    }

    /// Directory that receives backups
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup.dir {
            Some(dir) => dir.clone(),
            None => self
                .ledger
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// LEDGER LAYOUT (0-based)
// ============================================================================

/// Column positions inside a ledger row, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLayout {
    pub id: usize,
    pub sequence: usize,
    pub annotation: usize,
    /// First payload column
    pub payload: usize,
    /// Where source payloads are written; also where the comparable slice starts
    pub target: usize,
}

impl Default for LedgerLayout {
    fn default() -> Self {
        MergeConfig::default().layout()
    }
}

// ============================================================================
// TESTS
// ============================================================================
