// 🔑 Identifier Normalizer - raw id values → fixed-length digit strings
//
// Ids arrive in every shape a spreadsheet export can produce:
//   1234567890123456        plain
//   1234567890123456.0      float artifact
//   1.234567890123456E+15   scientific notation
//   " 1234-5678-9012-3456"  stray whitespace / NBSP / punctuation
// All of them must collapse to the same CanonicalId.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the master ledger key.
pub const PRIMARY_ID_LENGTH: usize = 16;

/// Length of the operation id used by the secondary attribute join.
pub const SECONDARY_ID_LENGTH: usize = 11;

// ============================================================================
// CANONICAL ID
// ============================================================================

/// Exactly N decimal digits. Only constructible through [`IdNormalizer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a raw value carries no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IdRejection {
    /// Missing or blank value
    Empty,
    /// Digit count after cleanup did not match the target length
    WrongLength { digits: usize, expected: usize },
}

impl fmt::Display for IdRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdRejection::Empty => write!(f, "empty id"),
            IdRejection::WrongLength { digits, expected } => {
                write!(f, "id has {digits} digit(s), expected {expected}")
            }
        }
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdNormalizer {
    length: usize,
}

impl IdNormalizer {
    pub fn new(length: usize) -> Self {
        IdNormalizer { length }
    }

    /// 16-digit ledger key
    pub fn primary() -> Self {
        Self::new(PRIMARY_ID_LENGTH)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Canonicalize a raw field value.
    pub fn normalize(&self, raw: &str) -> Result<CanonicalId, IdRejection> {
        let mut s = raw
            .trim_matches(|c: char| c.is_whitespace() || c == '\u{a0}')
            .replace('\u{a0}', "");

        if s.is_empty() {
            return Err(IdRejection::Empty);
        }

        if let Some(stripped) = s.strip_suffix(".0") {
            s = stripped.to_string();
        }

        if s.contains(|c: char| c == 'e' || c == 'E') {
            if let Some(rendered) = render_scientific(&s) {
                s = rendered;
            }
        }

        let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == self.length {
            Ok(CanonicalId(digits))
        } else {
            Err(IdRejection::WrongLength {
                digits: digits.len(),
                expected: self.length,
            })
        }
    }

    /// Convenience: `Some` for a valid id, `None` otherwise.
    pub fn canonical(&self, raw: &str) -> Option<CanonicalId> {
        self.normalize(raw).ok()
    }
}

impl Default for IdNormalizer {
    fn default() -> Self {
        Self::primary()
    }
}

/// "1.234567890123456E+15" → "1234567890123456". None when it isn't a float.
fn render_scientific(s: &str) -> Option<String> {
    let value = s.parse::<f64>().ok()?;
    if !value.is_finite() || value.abs() >= 1e38 {
        return None;
    }
    Some(format!("{}", value.trunc() as i128))
}

// ============================================================================
// TESTS
// ============================================================================
