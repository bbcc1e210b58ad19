// Ledger Merge - Core Library
// Reconciles source transaction batches into the master ledger.
// Exposes all modules for use in the CLI and tests

pub mod cell;
pub mod identifier;   // IdentifierNormalizer
pub mod fingerprint;  // SignatureComputer
pub mod table;
pub mod config;
pub mod error;
pub mod aggregate;    // SourceAggregator
pub mod index;        // LedgerIndex
pub mod engine;       // ReconciliationEngine
pub mod store;        // LedgerWriter
pub mod report;       // ReportGenerator
pub mod journal;
pub mod pipeline;

// Re-export commonly used types
pub use cell::Cell;
pub use identifier::{
    CanonicalId, IdNormalizer, IdRejection, PRIMARY_ID_LENGTH, SECONDARY_ID_LENGTH,
};
pub use fingerprint::{Fingerprint, SignatureComputer, DEFAULT_OFFSETS};
pub use table::Table;
pub use config::{LedgerLayout, MergeConfig};
pub use error::MergeError;
pub use aggregate::{
    aggregate, load_batches, validate_batch,
    Aggregation, BatchLoad, Provenance, RejectedRow, SkippedBatch,
    SourceBatch, SourceBucket, SourceRecord,
};
pub use index::{LedgerIndex, LedgerRow};
pub use engine::{
    IdOutcome, MergeDecision, MergeOutcome, MergeStats, ReconciliationEngine, Unmatched,
};
pub use report::RunReport;
pub use journal::{RunRecord, MergeEvent};
pub use pipeline::{run, RunOptions, RunResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
