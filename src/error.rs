use std::fmt;
use std::path::PathBuf;

/// Run-terminating conditions. Per-row and per-file problems never show up
/// here; they are collected as rejected rows / skipped batches instead.
#[derive(Debug)]
pub enum MergeError {
    /// The master ledger does not exist. Nothing is processed.
    MissingLedgerFile(PathBuf),
    /// The sources directory could not be listed.
    SourceDirUnreadable { path: PathBuf, reason: String },
    /// No source batch survived validation.
    EmptySourceSet,
    /// The ledger has no data rows.
    EmptyLedger,
    /// Configuration parse or validation error.
    Config(String),
    /// Read or write failure.
    Io { path: PathBuf, reason: String },
    /// The ledger itself could not be parsed as CSV.
    Csv { path: PathBuf, reason: String },
}

impl MergeError {
    /// Early stops that end the run with a message but are not failures.
    pub fn is_early_stop(&self) -> bool {
        matches!(self, MergeError::EmptySourceSet | MergeError::EmptyLedger)
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLedgerFile(path) => {
                write!(f, "ledger file not found: {}", path.display())
            }
            Self::SourceDirUnreadable { path, reason } => {
                write!(f, "cannot read sources directory {}: {reason}", path.display())
            }
            Self::EmptySourceSet => write!(f, "no valid source batches to process"),
            Self::EmptyLedger => write!(f, "ledger has no rows to reconcile"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Io { path, reason } => write!(f, "IO error on {}: {reason}", path.display()),
            Self::Csv { path, reason } => {
                write!(f, "cannot parse {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for MergeError {}
