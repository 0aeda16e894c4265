//! # Return Planning
//!
//! Pure return math: per-line availability, whole-request over-return
//! rejection, snapshot-priced refunds, and debt cancellation.
//!
//! ## Availability
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  quantity_available = quantity_ordered − Σ(previously returned)         │
//! │                                                                         │
//! │  Order line: 5 × ATTA-10KG                                              │
//! │  Return #1:  3          → available now 2                               │
//! │  Return #2:  3          → OverReturn (whole request rejected)           │
//! │  Return #2': 2          → available now 0                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Debt Before Cash
//! A return on an unpaid credit order cancels outstanding debt first:
//! `outstanding_reduction = min(refund, outstanding)`. Whatever refund
//! remains is a cash/credit-note obligation reported to the caller; the
//! ledger does not record the instrument.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{LedgerError, LedgerResult};
use crate::validation::validate_quantity;

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// One order line together with how much of it has already been returned,
/// as read inside the returns transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderedLine {
    pub product_id: String,
    pub quantity_ordered: i64,
    pub quantity_returned: i64,
    /// Unit price snapshot from the order line. Refunds always use this,
    /// never the current product price.
    pub unit_price_cents: i64,
}

impl OrderedLine {
    /// How much of this line can still be returned.
    #[inline]
    pub fn quantity_available(&self) -> i64 {
        (self.quantity_ordered - self.quantity_returned).max(0)
    }
}

/// One requested return line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnRequestLine {
    pub product_id: String,
    pub quantity: i64,
    pub reason: Option<String>,
}

/// A validated return line, priced from the order snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PlannedReturnLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub reason: Option<String>,
}

/// The validated outcome of return planning.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnPlan {
    pub lines: Vec<PlannedReturnLine>,
    /// Σ(quantity × snapshot unit price) over the lines.
    pub refund_cents: i64,
    /// `min(refund, order outstanding)` — the debt this return cancels.
    pub outstanding_reduction_cents: i64,
    /// Refund remainder owed to the customer in cash or as a credit note.
    /// Reported to the caller; not a ledger effect.
    pub cash_refund_cents: i64,
}

// =============================================================================
// Planning
// =============================================================================

/// Validates a return request against the order's lines and prior returns,
/// producing a [`ReturnPlan`].
///
/// ## Rules
/// - Every requested quantity must be positive.
/// - Every requested product must be on the order
///   (`ProductNotFound` otherwise).
/// - Requested quantities are aggregated per product and checked against
///   availability; ANY over-return rejects the WHOLE request.
/// - Refund is priced from the order-line snapshot.
pub fn plan_return(
    ordered: &[OrderedLine],
    requested: &[ReturnRequestLine],
    credit_outstanding_cents: i64,
) -> LedgerResult<ReturnPlan> {
    if requested.is_empty() {
        return Err(crate::error::ValidationError::Required {
            field: "return lines".to_string(),
        }
        .into());
    }

    let by_product: HashMap<&str, &OrderedLine> = ordered
        .iter()
        .map(|l| (l.product_id.as_str(), l))
        .collect();

    // Aggregate the request per product so a duplicated line cannot slip
    // past the availability check.
    let mut requested_totals: HashMap<&str, i64> = HashMap::new();
    for line in requested {
        validate_quantity(line.quantity)?;
        *requested_totals.entry(line.product_id.as_str()).or_insert(0) += line.quantity;
    }

    for (product_id, total_requested) in &requested_totals {
        let ordered_line = by_product
            .get(product_id)
            .ok_or_else(|| LedgerError::ProductNotFound(product_id.to_string()))?;

        let available = ordered_line.quantity_available();
        if *total_requested > available {
            return Err(LedgerError::OverReturn {
                product_id: product_id.to_string(),
                available,
                requested: *total_requested,
            });
        }
    }

    let lines: Vec<PlannedReturnLine> = requested
        .iter()
        .map(|line| PlannedReturnLine {
            product_id: line.product_id.clone(),
            quantity: line.quantity,
            // Lookup cannot fail: every product was resolved above.
            unit_price_cents: by_product[line.product_id.as_str()].unit_price_cents,
            reason: line.reason.clone(),
        })
        .collect();

    let refund_cents: i64 = lines
        .iter()
        .map(|l| l.unit_price_cents * l.quantity)
        .sum();
    let outstanding_reduction_cents = refund_cents.min(credit_outstanding_cents.max(0));

    Ok(ReturnPlan {
        lines,
        refund_cents,
        outstanding_reduction_cents,
        cash_refund_cents: refund_cents - outstanding_reduction_cents,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
