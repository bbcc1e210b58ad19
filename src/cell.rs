// 🧱 Cell Values - typed fields for ledger and source tables
// CSV gives us strings; the merge rules need to know integer vs decimal vs text.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CELL
// ============================================================================

/// One field of a table row.
///
/// Decimals keep the exact text they were read with so that rows the engine
/// never touches are written back byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Int(i64),
    Decimal { value: f64, text: String },
    Text(String),
}

impl Cell {
    /// Classify a raw CSV field.
    ///
    /// - blank (after trimming) → `Empty`
    /// - canonical integer text ("42", "-7", no leading zeros) → `Int`
    /// - plain decimal notation ("12.50", "-0.3") → `Decimal`, as long as an
    ///   `f64` holds it exactly (at most 15 significant digits)
    /// - anything else → `Text`, kept verbatim
    pub fn parse(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            // "0012" or "+5" would not survive a round trip as an integer
            if i.to_string() == trimmed {
                return Cell::Int(i);
            }
            return Cell::Text(raw.to_string());
        }

        if is_plain_decimal(trimmed) && significant_digits(trimmed) <= MAX_EXACT_DIGITS {
            if let Ok(value) = trimmed.parse::<f64>() {
                if value.is_finite() {
                    return Cell::Decimal {
                        value,
                        text: trimmed.to_string(),
                    };
                }
            }
        }

        Cell::Text(raw.to_string())
    }

    /// Build a decimal cell rendered with two decimal places.
    pub fn decimal(value: f64) -> Cell {
        Cell::Decimal {
            value,
            text: without_negative_zero(format!("{:.2}", value)),
        }
    }

    pub fn text(s: impl Into<String>) -> Cell {
        Cell::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric value, if this cell holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Decimal { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Comparison form used by fingerprints.
    ///
    /// Integral numbers render as bare integers, other numbers with exactly
    /// two decimals, text trimmed, empty as "".
    pub fn normalized(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Int(i) => i.to_string(),
            Cell::Decimal { value, .. } => {
                let text = if value.fract() == 0.0 {
                    format!("{:.0}", value)
                } else {
                    format!("{:.2}", value)
                };
                without_negative_zero(text)
            }
            Cell::Text(s) => s.trim().to_string(),
        }
    }

    /// Number formatting applied when source values are written into the ledger:
    /// integral decimals become integers, the rest get two decimals.
    pub fn formatted(&self) -> Cell {
        match self {
            Cell::Decimal { value, .. } => {
                if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                    Cell::Int(*value as i64)
                } else {
                    Cell::decimal(*value)
                }
            }
            other => other.clone(),
        }
    }

    /// Text written to the CSV field.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Int(i) => i.to_string(),
            Cell::Decimal { text, .. } => text.clone(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_field())
    }
}

/// Digits an `f64` reproduces exactly.
const MAX_EXACT_DIGITS: usize = 15;

/// Digit count ignoring sign, decimal point and leading zeros.
fn significant_digits(s: &str) -> usize {
    s.chars()
        .filter(|c| c.is_ascii_digit())
        .skip_while(|c| *c == '0')
        .count()
}

/// "-0" and "-0.00" render as their unsigned form.
fn without_negative_zero(text: String) -> String {
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

/// Digits with at most one '.', an optional leading '-', and at least one digit.
fn is_plain_decimal(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let mut dots = 0;
    let mut digits = 0;
    for c in body.chars() {
        match c {
            '.' => dots += 1,
            '0'..='9' => digits += 1,
            _ => return false,
        }
    }
    dots <= 1 && digits > 0
}

// ============================================================================
// TESTS
// ============================================================================
