//! # Error Types
//!
//! Domain-specific error types for khata-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  khata-core errors (this file)                                         │
//! │  ├── LedgerError      - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  khata-db errors (separate crate)                                      │
//! │  └── DbError          - Storage failures + embedded LedgerError        │
//! │                                                                         │
//! │  Flow: ValidationError → LedgerError → DbError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (ids, amounts, quantities)
//! 3. Errors are enum variants, never String
//! 4. Every variant is recoverable by the caller: the ledger guarantees no
//!    partial state mutation occurred when one of these is returned

use thiserror::Error;

// =============================================================================
// Ledger Error
// =============================================================================

/// Business rule violations.
///
/// These are typed failures a caller can act on (correct the split, shrink
/// the cart, collect cash instead of credit). None of them leaves partial
/// state behind.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Product cannot be found, or is not on the order being returned.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Order cannot be found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Customer cannot be found.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Stock location cannot be found.
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    /// Not enough quantity at the location to apply a decrement.
    ///
    /// ## When This Occurs
    /// - A sale line asks for more than `current_quantity`
    /// - A manual adjustment would drive the quantity negative
    /// - Two concurrent checkouts raced and this one lost
    #[error(
        "Insufficient stock for product {product_id} at {location_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: String,
        location_id: String,
        available: i64,
        requested: i64,
    },

    /// The tendered cash + credit split does not add up to the cart total.
    #[error("Payment mismatch: cart total {total_cents} cents, tendered {tendered_cents} cents")]
    PaymentMismatch { total_cents: i64, tendered_cents: i64 },

    /// The credit portion would push the customer past their limit.
    ///
    /// A credit limit of 0 always rejects any credit portion.
    #[error(
        "Credit limit exceeded for {customer_id}: limit {credit_limit_cents}, balance {current_balance_cents}, requested {requested_cents}"
    )]
    CreditLimitExceeded {
        customer_id: String,
        credit_limit_cents: i64,
        current_balance_cents: i64,
        requested_cents: i64,
    },

    /// Payment amount exceeds what is outstanding.
    #[error("Overpayment not allowed: outstanding {outstanding_cents} cents, amount {amount_cents} cents")]
    OverpaymentNotAllowed {
        outstanding_cents: i64,
        amount_cents: i64,
    },

    /// A return line asks for more than is still returnable on the order.
    ///
    /// The whole return request is rejected; no line is partially applied.
    #[error("Over-return for product {product_id}: available {available}, requested {requested}")]
    OverReturn {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when input doesn't meet structural requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
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

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate SKU).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LedgerError::InsufficientStock {
            product_id: "p-1".to_string(),
            location_id: "main".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1 at main: available 3, requested 5"
        );

        let err = LedgerError::OverpaymentNotAllowed {
            outstanding_cents: 1000,
            amount_cents: 1500,
        };
        assert!(err.to_string().contains("outstanding 1000"));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "due_date".to_string(),
        };
        assert_eq!(err.to_string(), "due_date is required");

        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_ledger_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let ledger_err: LedgerError = validation_err.into();
        assert!(matches!(ledger_err, LedgerError::Validation(_)));
    }
}
