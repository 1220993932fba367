//! # Error Types
//!
//! Domain-specific error types for apothecary-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  apothecary-core (this file)                                           │
//! │  ├── CoreError         - Business rule violations                      │
//! │  └── ValidationError   - Malformed input                               │
//! │                                                                         │
//! │  apothecary-db                                                         │
//! │  ├── DbError           - Storage failures                              │
//! │  └── FulfillmentError  - Engine outcome (stock, state, numbering)      │
//! │                                                                         │
//! │  api-server                                                            │
//! │  └── ApiError          - JSON body + HTTP status                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Stock Shortage
// =============================================================================

/// One product that cannot cover the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockShortage {
    pub product_id: String,
    pub product_name: String,
    pub available: i64,
    pub requested: i64,
}

impl std::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (available {}, requested {})",
            self.product_name, self.available, self.requested
        )
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced product does not exist (or was deactivated).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// One or more lines exceed on-hand quantity.
    ///
    /// Every offending product is listed, not just the first one found.
    #[error("Insufficient stock for {}", format_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    /// A document is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Dispensing a prescription that is already dispensed or cancelled
    /// - Completing a sale that is already completed
    /// - Cancelling anything that reached a terminal state
    #[error("{document} is {from}, cannot move to {to}")]
    InvalidStateTransition {
        document: String,
        from: String,
        to: String,
    },

    /// Document number is not of the form `<PREFIX><YYYYMMDD><NNNN>`.
    #[error("Malformed document number: {0}")]
    MalformedDocumentNumber(String),

    /// The day's counter reached 9999.
    #[error("Document numbers exhausted for prefix {0}")]
    NumberSpaceExhausted(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Joins shortages into one human-readable list.
pub fn format_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any lock is taken or any row is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_lists_every_product() {
        let err = CoreError::InsufficientStock(vec![
            StockShortage {
                product_id: "p1".to_string(),
                product_name: "Amoxicillin 500mg".to_string(),
                available: 2,
                requested: 5,
            },
            StockShortage {
                product_id: "p2".to_string(),
                product_name: "Ibuprofen 200mg".to_string(),
                available: 0,
                requested: 1,
            },
        ]);

        assert_eq!(
            err.to_string(),
            "Insufficient stock for Amoxicillin 500mg (available 2, requested 5), \
             Ibuprofen 200mg (available 0, requested 1)"
        );
    }

    #[test]
    fn test_state_transition_message() {
        let err = CoreError::InvalidStateTransition {
            document: "Prescription RX202610160001".to_string(),
            from: "dispensed".to_string(),
            to: "cancelled".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Prescription RX202610160001 is dispensed, cannot move to cancelled"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("items").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
