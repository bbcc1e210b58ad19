// 🧬 Signature Computer - fixed-offset fingerprints for duplicate detection
//
// Two payloads are the same transaction when the fields at the agreed offsets
// match after normalization. Everything else (descriptions, running balances,
// free-form columns) is ignored.

use crate::cell::Cell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Offsets into the comparable slice agreed with upstream producers
pub const DEFAULT_OFFSETS: [usize; 5] = [6, 10, 11, 14, 17];

// ============================================================================
// FINGERPRINT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(Vec<String>);

impl Fingerprint {
    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// SHA-256 hex digest, for storing in the journal instead of raw values
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for value in &self.0 {
            hasher.update(value.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// SIGNATURE COMPUTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureComputer {
    offsets: Vec<usize>,
}

impl SignatureComputer {
    pub fn new(offsets: Vec<usize>) -> Self {
        SignatureComputer { offsets }
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Fingerprint of a payload slice. Callers align the slice; offsets past
    /// the end read as "".
    pub fn compute(&self, payload: &[Cell]) -> Fingerprint {
        Fingerprint(
            self.offsets
                .iter()
                .map(|&idx| payload.get(idx).map(Cell::normalized).unwrap_or_default())
                .collect(),
        )
    }
}

impl Default for SignatureComputer {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSETS.to_vec())
    }
}

// ============================================================================
// TESTS
// ============================================================================
