//! # Validation Module
//!
//! Normalization and charset rules for linear barcode candidates.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Candidate Pipeline                                 │
//! │                                                                         │
//! │  Linear decoder raw text  "  abc-123\n"                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  normalize: trim + upper-case        "ABC-123"                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  charset: A-Z 0-9 - _ . /            ok → may win the race             │
//! │           │                                                             │
//! │           └── rejected → dropped silently, race keeps running          │
//! │                                                                         │
//! │  QR payloads skip this module entirely: they are free-form text.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use optiscan_core::validation::normalize_barcode;
//!
//! assert_eq!(normalize_barcode(" ab-12 ").unwrap(), "AB-12");
//! assert!(normalize_barcode("bad code!").is_err());
//! ```

use crate::error::ValidationError;
use crate::MAX_BARCODE_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Punctuation accepted inside asset tags, besides ASCII letters and digits.
const ALLOWED_PUNCTUATION: [char; 4] = ['-', '_', '.', '/'];

/// Returns true if `c` belongs to the barcode charset.
///
/// Only upper-case letters pass; callers normalize first.
#[inline]
pub fn is_barcode_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || ALLOWED_PUNCTUATION.contains(&c)
}

/// Validates an already-normalized barcode candidate.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_BARCODE_LEN`] characters
/// - Only `A-Z`, `0-9`, `-`, `_`, `.`, `/`
pub fn validate_barcode(text: &str) -> ValidationResult<()> {
    if text.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if text.chars().count() > MAX_BARCODE_LEN {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: MAX_BARCODE_LEN,
        });
    }

    if !text.chars().all(is_barcode_char) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters, digits, '-', '_', '.' and '/'".to_string(),
        });
    }

    Ok(())
}

/// Trims and upper-cases a raw barcode candidate, then validates it.
///
/// ## Returns
/// The normalized text, ready to be emitted as a `DecodeResult`.
///
/// ## Example
/// ```rust
/// use optiscan_core::validation::normalize_barcode;
///
/// assert_eq!(normalize_barcode("\tinv-0042\r\n").unwrap(), "INV-0042");
/// assert!(normalize_barcode("   ").is_err());
/// ```
pub fn normalize_barcode(raw: &str) -> ValidationResult<String> {
    let normalized = raw.trim().to_uppercase();
    validate_barcode(&normalized)?;
    Ok(normalized)
}

// =============================================================================
// Unit Tests
// =============================================================================
