//! # Checkout Planning
//!
//! Pure checkout math: subtotal, cash/credit split classification, and
//! credit-limit enforcement. One shared implementation invoked by any sales
//! channel, so cash-sale and credit-sale screens can never disagree on the
//! arithmetic.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cart lines + tender + customer                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  plan_checkout() ← THIS MODULE (pure, no I/O)                           │
//! │       │                                                                 │
//! │       ├── cart empty / bad quantity?      → Validation                  │
//! │       ├── product on two lines?           → Validation (duplicate)      │
//! │       ├── cash + credit != subtotal?      → PaymentMismatch             │
//! │       ├── credit > 0 without due date?    → Validation (due_date)       │
//! │       ├── balance + credit > limit?       → CreditLimitExceeded         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CheckoutPlan { split, status, due/allowed dates }                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  khata-db CheckoutEngine commits the plan transactionally               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tax, if any, is applied by the caller before this boundary; the subtotal
//! here IS the total the tender must cover.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::types::{Customer, PaymentStatus};
use crate::validation::{validate_cart_size, validate_price_cents, validate_quantity};
use crate::{DEFAULT_ALLOWED_DELAY_DAYS, PAYMENT_SPLIT_TOLERANCE_CENTS};

// =============================================================================
// Inputs
// =============================================================================

/// One line of a checkout cart.
///
/// `unit_price_cents` is what the cashier agreed to charge; the engine
/// snapshots it onto the order line. It may differ from the product's
/// current selling price (negotiated or promotional pricing).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// How the customer is paying: how much now in cash, how much on credit.
///
/// `Cash`, `Credit`, and `Split` tenders from the UI all normalize to this
/// pair; the classification IS the pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tender {
    pub cash_cents: i64,
    pub credit_cents: i64,
}

impl Tender {
    /// Full amount in cash.
    pub const fn cash(total_cents: i64) -> Self {
        Tender {
            cash_cents: total_cents,
            credit_cents: 0,
        }
    }

    /// Full amount on credit.
    pub const fn credit(total_cents: i64) -> Self {
        Tender {
            cash_cents: 0,
            credit_cents: total_cents,
        }
    }

    /// Part cash, part credit.
    pub const fn split(cash_cents: i64, credit_cents: i64) -> Self {
        Tender {
            cash_cents,
            credit_cents,
        }
    }

    /// Total tendered across both portions.
    pub const fn total_cents(&self) -> i64 {
        self.cash_cents + self.credit_cents
    }
}

/// Due date and grace period for the credit portion of a sale.
/// Required whenever the tender carries credit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreditTerms {
    #[ts(as = "String")]
    pub due_date: DateTime<Utc>,
    /// Days past `due_date` before the order counts as overdue.
    pub allowed_delay_days: i64,
}

impl CreditTerms {
    /// Terms due on `due_date` with the default (zero) grace period.
    pub fn due_on(due_date: DateTime<Utc>) -> Self {
        CreditTerms {
            due_date,
            allowed_delay_days: DEFAULT_ALLOWED_DELAY_DAYS,
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// The validated outcome of checkout planning.
///
/// Everything the transactional engine needs to commit: the frozen
/// subtotal, the classified split, the initial payment status, and the
/// credit dates.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutPlan {
    pub subtotal_cents: i64,
    /// Cash collected now. Derived as `subtotal - credit` so a 1-cent
    /// tender rounding slip never leaks into the ledger.
    pub cash_cents: i64,
    /// Portion charged to the customer's credit line.
    pub credit_cents: i64,
    pub payment_status: PaymentStatus,
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub allowed_until: Option<DateTime<Utc>>,
}

// =============================================================================
// Planning
// =============================================================================

/// Sum of `unit_price × quantity` over the cart.
///
/// Checked arithmetic: a cart whose total does not fit in an i64 is a
/// malformed input, not a wrap-around.
pub fn subtotal_cents(lines: &[CartLine]) -> LedgerResult<i64> {
    let mut subtotal: i64 = 0;
    for line in lines {
        subtotal = line
            .unit_price_cents
            .checked_mul(line.quantity)
            .and_then(|line_total| subtotal.checked_add(line_total))
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "subtotal".to_string(),
                min: 0,
                max: i64::MAX,
            })?;
    }
    Ok(subtotal)
}

/// Validates a cart + tender against a customer and produces a
/// [`CheckoutPlan`].
///
/// ## Rules
/// 1. Cart non-empty, every quantity positive, every price non-negative.
/// 2. Each product appears on at most one line. The till merges repeat
///    scans into one line, so order lines map one-to-one to products and
///    a return can always resolve a product to its single snapshot price.
/// 3. `cash + credit` must equal the subtotal within
///    [`PAYMENT_SPLIT_TOLERANCE_CENTS`]; otherwise `PaymentMismatch`.
/// 4. A credit portion requires [`CreditTerms`].
/// 5. `balance + credit <= limit` or `CreditLimitExceeded`. A limit of 0
///    rejects any credit portion.
///
/// Pure function: the caller (the db-side engine) re-asserts the stock and
/// limit invariants with guarded updates inside its transaction; this
/// function is where the rules live and where they are unit tested.
pub fn plan_checkout(
    lines: &[CartLine],
    tender: Tender,
    customer: &Customer,
    terms: Option<CreditTerms>,
) -> LedgerResult<CheckoutPlan> {
    validate_cart_size(lines.len())?;
    let mut seen: HashSet<&str> = HashSet::with_capacity(lines.len());
    for line in lines {
        validate_quantity(line.quantity)?;
        validate_price_cents(line.unit_price_cents)?;
        if !seen.insert(line.product_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "product".to_string(),
                value: line.product_id.clone(),
            }
            .into());
        }
    }
    if tender.cash_cents < 0 || tender.credit_cents < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "tender".to_string(),
        }
        .into());
    }

    let subtotal = subtotal_cents(lines)?;

    let tendered = tender.total_cents();
    if (tendered - subtotal).abs() > PAYMENT_SPLIT_TOLERANCE_CENTS {
        return Err(LedgerError::PaymentMismatch {
            total_cents: subtotal,
            tendered_cents: tendered,
        });
    }

    let credit = tender.credit_cents.min(subtotal);
    // Credit is authoritative within tolerance; cash absorbs the slip.
    let cash = subtotal - credit;

    if credit == 0 {
        return Ok(CheckoutPlan {
            subtotal_cents: subtotal,
            cash_cents: cash,
            credit_cents: 0,
            payment_status: PaymentStatus::Paid,
            due_date: None,
            allowed_until: None,
        });
    }

    let terms = terms.ok_or(ValidationError::Required {
        field: "due_date".to_string(),
    })?;
    if terms.allowed_delay_days < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "allowed_delay_days".to_string(),
        }
        .into());
    }

    if customer.current_balance_cents + credit > customer.credit_limit_cents {
        return Err(LedgerError::CreditLimitExceeded {
            customer_id: customer.id.clone(),
            credit_limit_cents: customer.credit_limit_cents,
            current_balance_cents: customer.current_balance_cents,
            requested_cents: credit,
        });
    }

    Ok(CheckoutPlan {
        subtotal_cents: subtotal,
        cash_cents: cash,
        credit_cents: credit,
        payment_status: PaymentStatus::Pending,
        due_date: Some(terms.due_date),
        allowed_until: Some(terms.due_date + Duration::days(terms.allowed_delay_days)),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
