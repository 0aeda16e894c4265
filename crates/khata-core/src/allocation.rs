//! # Payment Allocation
//!
//! Pure oldest-due-first allocation of an incoming payment across a
//! customer's outstanding credit orders.
//!
//! ## Ordering Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Orders sorted by: due_date ASC, then created_at ASC                    │
//! │                                                                         │
//! │  payBalance(customer, 120.00)                                           │
//! │                                                                         │
//! │  Order1  due 2025-01-01  outstanding 100.00  ◄── settle fully (100.00)  │
//! │  Order2  due 2025-02-01  outstanding  80.00  ◄── apply rest   ( 20.00)  │
//! │  Order3  due 2025-03-01  outstanding  50.00      untouched              │
//! │                                                                         │
//! │  Customer balance: 230.00 → 110.00                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transactional engine in khata-db reads outstanding orders, calls
//! [`allocate_oldest_first`], and applies each [`Allocation`] through the
//! same apply-to-order primitive that single-order payments use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{LedgerError, LedgerResult};
use crate::validation::validate_payment_amount;

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Snapshot of one unpaid credit order, as read inside the payment
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OutstandingOrder {
    pub order_id: String,
    #[ts(as = "String")]
    pub due_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub outstanding_cents: i64,
}

/// How much of a payment lands on one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub order_id: String,
    pub amount_cents: i64,
    /// True when this allocation brings the order's outstanding to zero.
    pub settles_order: bool,
}

// =============================================================================
// Allocation
// =============================================================================

/// Distributes `amount_cents` across `orders`, oldest due date first,
/// ties broken by creation time.
///
/// ## Rules
/// - `amount_cents` must be positive.
/// - `amount_cents` must not exceed the summed outstanding (the customer's
///   balance); otherwise `OverpaymentNotAllowed`.
/// - Each order receives `min(remaining, outstanding)` until the amount
///   is exhausted.
///
/// Orders with zero outstanding are skipped rather than rejected, so the
/// caller may pass an unfiltered snapshot.
pub fn allocate_oldest_first(
    orders: &[OutstandingOrder],
    amount_cents: i64,
) -> LedgerResult<Vec<Allocation>> {
    validate_payment_amount(amount_cents)?;

    let total_outstanding: i64 = orders.iter().map(|o| o.outstanding_cents).sum();
    if amount_cents > total_outstanding {
        return Err(LedgerError::OverpaymentNotAllowed {
            outstanding_cents: total_outstanding,
            amount_cents,
        });
    }

    let mut queue: Vec<&OutstandingOrder> =
        orders.iter().filter(|o| o.outstanding_cents > 0).collect();
    queue.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut remaining = amount_cents;
    let mut allocations = Vec::new();

    for order in queue {
        if remaining == 0 {
            break;
        }
        let applied = remaining.min(order.outstanding_cents);
        allocations.push(Allocation {
            order_id: order.order_id.clone(),
            amount_cents: applied,
            settles_order: applied == order.outstanding_cents,
        });
        remaining -= applied;
    }

    Ok(allocations)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(id: &str, due: (i32, u32, u32), created_min: u32, outstanding: i64) -> OutstandingOrder {
        OutstandingOrder {
            order_id: id.to_string(),
            due_date: Utc.with_ymd_and_hms(due.0, due.1, due.2, 0, 0, 0).unwrap(),
            created_at: Utc
                .with_ymd_and_hms(2024, 12, 1, 10, created_min, 0)
                .unwrap(),
            outstanding_cents: outstanding,
        }
    }

    /// 100.00 due Jan and 80.00 due Feb: paying 120.00 settles the
    /// January order and leaves 60.00 on the February one.
    #[test]
    fn test_oldest_first_split() {
        let orders = vec![
            order("feb", (2025, 2, 1), 0, 8_000),
            order("jan", (2025, 1, 1), 0, 10_000),
        ];

        let allocations = allocate_oldest_first(&orders, 12_000).unwrap();

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].order_id, "jan");
        assert_eq!(allocations[0].amount_cents, 10_000);
        assert!(allocations[0].settles_order);
        assert_eq!(allocations[1].order_id, "feb");
        assert_eq!(allocations[1].amount_cents, 2_000);
        assert!(!allocations[1].settles_order);
    }

    #[test]
    fn test_equal_due_dates_break_by_creation() {
        let orders = vec![
            order("later", (2025, 1, 1), 30, 5_000),
            order("earlier", (2025, 1, 1), 10, 5_000),
        ];

        let allocations = allocate_oldest_first(&orders, 5_000).unwrap();

        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].order_id, "earlier");
        assert!(allocations[0].settles_order);
    }

    #[test]
    fn test_exact_full_settlement() {
        let orders = vec![
            order("a", (2025, 1, 1), 0, 3_000),
            order("b", (2025, 2, 1), 0, 7_000),
        ];

        let allocations = allocate_oldest_first(&orders, 10_000).unwrap();
        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| a.settles_order));
    }

    #[test]
    fn test_overpayment_rejected() {
        let orders = vec![order("a", (2025, 1, 1), 0, 3_000)];
        let err = allocate_oldest_first(&orders, 3_001).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::OverpaymentNotAllowed {
                outstanding_cents: 3_000,
                amount_cents: 3_001
            }
        ));
    }

    #[test]
    fn test_zero_and_negative_amount_rejected() {
        let orders = vec![order("a", (2025, 1, 1), 0, 3_000)];
        assert!(allocate_oldest_first(&orders, 0).is_err());
        assert!(allocate_oldest_first(&orders, -100).is_err());
    }

    #[test]
    fn test_settled_orders_skipped() {
        let orders = vec![
            order("settled", (2024, 12, 1), 0, 0),
            order("open", (2025, 1, 1), 0, 4_000),
        ];

        let allocations = allocate_oldest_first(&orders, 4_000).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].order_id, "open");
    }

    #[test]
    fn test_no_outstanding_at_all_is_overpayment() {
        let orders: Vec<OutstandingOrder> = vec![];
        let err = allocate_oldest_first(&orders, 100).unwrap_err();
        assert!(matches!(err, LedgerError::OverpaymentNotAllowed { .. }));
    }
}
