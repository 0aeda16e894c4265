//! # Payment Allocation Engine
//!
//! Settlement of outstanding credit, either against one named order or
//! against the whole balance with oldest-due-first allocation.
//!
//! ## The Shared Primitive
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pay_order(order, 50.00)          pay_balance(customer, 120.00)         │
//! │       │                                │                                │
//! │       │                        allocate_oldest_first()                  │
//! │       │                                │  (one Allocation per order)    │
//! │       ▼                                ▼                                │
//! │            apply_to_order(tx, order_id, amount)                         │
//! │            ──────────────────────────────────                           │
//! │            outstanding -= amount (guarded >= amount)                    │
//! │            status → paid when outstanding hits 0,                       │
//! │                     partially_paid otherwise                            │
//! │                                                                         │
//! │  Then one balance decrement and ONE payment row per call:               │
//! │  order_id = the order for pay_order, NULL for pay_balance.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::engine::begin_write;
use crate::engine::checkout::load_customer;
use crate::error::{DbError, DbResult};
use khata_core::allocation::{allocate_oldest_first, Allocation, OutstandingOrder};
use khata_core::validation::validate_payment_amount;
use khata_core::{LedgerError, Payment, PaymentMethod, SalesOrder};

/// Transactional engine for credit settlement.
#[derive(Debug, Clone)]
pub struct PaymentAllocationEngine {
    pool: SqlitePool,
}

impl PaymentAllocationEngine {
    /// Creates a new PaymentAllocationEngine.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentAllocationEngine { pool }
    }

    /// Records a payment against one named order.
    ///
    /// ## Errors
    /// - `Ledger(Validation)` - amount not positive
    /// - `Ledger(OrderNotFound)` - unknown order
    /// - `Ledger(OverpaymentNotAllowed)` - amount exceeds the order's
    ///   outstanding (also the case for a fully settled order)
    pub async fn pay_order(
        &self,
        order_id: &str,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> DbResult<Payment> {
        validate_payment_amount(amount_cents).map_err(LedgerError::from)?;

        let mut tx = begin_write(&self.pool).await?;

        let order = load_order(&mut tx, order_id).await?;
        if amount_cents > order.credit_outstanding_cents {
            return Err(LedgerError::OverpaymentNotAllowed {
                outstanding_cents: order.credit_outstanding_cents,
                amount_cents,
            }
            .into());
        }

        let now = Utc::now();
        apply_to_order(&mut tx, order_id, amount_cents, now).await?;
        reduce_balance(&mut tx, &order.customer_id, amount_cents, now).await?;

        let payment = insert_payment(
            &mut tx,
            &order.customer_id,
            Some(order_id),
            amount_cents,
            method,
            now,
        )
        .await?;

        tx.commit().await?;

        info!(
            order_id = %order_id,
            amount = amount_cents,
            "Order payment recorded"
        );
        Ok(payment)
    }

    /// Records one payment against the customer's whole balance,
    /// distributed oldest due date first.
    ///
    /// Exactly one payment row is written, with a NULL order id; the
    /// per-order distribution is returned for receipt display but lives in
    /// the ledger only as the orders' reduced outstanding amounts.
    ///
    /// ## Errors
    /// - `Ledger(Validation)` - amount not positive
    /// - `Ledger(CustomerNotFound)` - unknown customer
    /// - `Ledger(OverpaymentNotAllowed)` - amount exceeds the balance
    pub async fn pay_balance(
        &self,
        customer_id: &str,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> DbResult<(Payment, Vec<Allocation>)> {
        validate_payment_amount(amount_cents).map_err(LedgerError::from)?;

        let mut tx = begin_write(&self.pool).await?;

        let customer = load_customer(&mut tx, customer_id).await?;
        let outstanding = outstanding_in_tx(&mut tx, &customer.id).await?;
        let allocations =
            allocate_oldest_first(&outstanding, amount_cents).map_err(DbError::from)?;

        let now = Utc::now();
        for allocation in &allocations {
            apply_to_order(&mut tx, &allocation.order_id, allocation.amount_cents, now).await?;
        }
        reduce_balance(&mut tx, &customer.id, amount_cents, now).await?;

        let payment =
            insert_payment(&mut tx, &customer.id, None, amount_cents, method, now).await?;

        tx.commit().await?;

        info!(
            customer_id = %customer_id,
            amount = amount_cents,
            orders = allocations.len(),
            "Balance payment recorded"
        );
        Ok((payment, allocations))
    }
}

// =============================================================================
// Transaction primitives
// =============================================================================

async fn load_order(tx: &mut Transaction<'_, Sqlite>, order_id: &str) -> DbResult<SalesOrder> {
    sqlx::query_as::<_, SalesOrder>("SELECT * FROM sales_orders WHERE id = ?1")
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::OrderNotFound(order_id.to_string()).into())
}

/// Reads the customer's unpaid orders in allocation order, inside the
/// payment transaction.
async fn outstanding_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    customer_id: &str,
) -> DbResult<Vec<OutstandingOrder>> {
    let orders = sqlx::query_as::<_, SalesOrder>(
        r#"
        SELECT * FROM sales_orders
        WHERE customer_id = ?1 AND credit_outstanding_cents > 0
        ORDER BY due_date ASC, created_at ASC
        "#,
    )
    .bind(customer_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(orders
        .into_iter()
        .map(|o| OutstandingOrder {
            order_id: o.id,
            due_date: o.due_date.unwrap_or(o.created_at),
            created_at: o.created_at,
            outstanding_cents: o.credit_outstanding_cents,
        })
        .collect())
}

/// Reduces one order's outstanding and recomputes its status. Shared by
/// single-order and whole-balance payments, and by the returns engine.
pub(crate) async fn apply_to_order(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
    amount_cents: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sales_orders
        SET credit_outstanding_cents = credit_outstanding_cents - ?1,
            payment_status = CASE
                WHEN credit_outstanding_cents - ?1 = 0 THEN 'paid'
                ELSE 'partially_paid'
            END,
            updated_at = ?2
        WHERE id = ?3 AND credit_outstanding_cents >= ?1
        "#,
    )
    .bind(amount_cents)
    .bind(now)
    .bind(order_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        let order = load_order(tx, order_id).await?;
        return Err(LedgerError::OverpaymentNotAllowed {
            outstanding_cents: order.credit_outstanding_cents,
            amount_cents,
        }
        .into());
    }
    Ok(())
}

/// Guarded balance decrement. The balance equals the summed outstanding,
/// so after the order-side guards this cannot underflow; if it ever does
/// the ledger has drifted and the transaction must die.
pub(crate) async fn reduce_balance(
    tx: &mut Transaction<'_, Sqlite>,
    customer_id: &str,
    amount_cents: i64,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET current_balance_cents = current_balance_cents - ?1, updated_at = ?2
        WHERE id = ?3 AND current_balance_cents >= ?1
        "#,
    )
    .bind(amount_cents)
    .bind(now)
    .bind(customer_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::Internal(format!(
            "balance drift for customer {customer_id}: cannot reduce by {amount_cents}"
        )));
    }
    Ok(())
}

async fn insert_payment(
    tx: &mut Transaction<'_, Sqlite>,
    customer_id: &str,
    order_id: Option<&str>,
    amount_cents: i64,
    method: PaymentMethod,
    now: DateTime<Utc>,
) -> DbResult<Payment> {
    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        order_id: order_id.map(str::to_string),
        amount_cents,
        method,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO payments (id, customer_id, order_id, amount_cents, method, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.customer_id)
    .bind(&payment.order_id)
    .bind(payment.amount_cents)
    .bind(payment.method)
    .bind(payment.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(payment)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::checkout::CheckoutRequest;
    use crate::test_support::{fixture, test_db, Fixture};
    use chrono::Duration;
    use khata_core::checkout::{CartLine, CreditTerms, Tender};
    use khata_core::PaymentStatus;

    async fn credit_order(
        db: &crate::Database,
        fx: &Fixture,
        credit_cents: i64,
        due_in_days: i64,
    ) -> SalesOrder {
        db.checkout()
            .checkout(CheckoutRequest {
                customer_id: fx.customer.id.clone(),
                location_id: fx.store.id.clone(),
                lines: vec![CartLine {
                    product_id: fx.product.id.clone(),
                    quantity: 1,
                    unit_price_cents: credit_cents,
                }],
                tender: Tender::credit(credit_cents),
                terms: Some(CreditTerms::due_on(Utc::now() + Duration::days(due_in_days))),
                cashier: "till-1".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_then_full_payment() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_order(&db, &fx, 10_000, 30).await;

        let engine = db.payments();
        engine.pay_order(&order.id, 4_000, PaymentMethod::Cash).await.unwrap();

        let after = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(after.credit_outstanding_cents, 6_000);
        assert_eq!(after.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(
            db.customers().get_by_id(&fx.customer.id).await.unwrap().current_balance_cents,
            6_000
        );

        engine.pay_order(&order.id, 6_000, PaymentMethod::Card).await.unwrap();

        let settled = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(settled.credit_outstanding_cents, 0);
        assert_eq!(settled.payment_status, PaymentStatus::Paid);
        assert_eq!(
            db.customers().get_by_id(&fx.customer.id).await.unwrap().current_balance_cents,
            0
        );

        let payments = db.orders().get_payments(&order.id).await.unwrap();
        assert_eq!(payments.len(), 2);
    }

    #[tokio::test]
    async fn test_overpaying_order_rejected_and_rolls_back() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_order(&db, &fx, 5_000, 30).await;

        let err = db
            .payments()
            .pay_order(&order.id, 5_001, PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Ledger(LedgerError::OverpaymentNotAllowed {
                outstanding_cents: 5_000,
                amount_cents: 5_001
            })
        ));

        let after = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(after.credit_outstanding_cents, 5_000);
        assert!(db.orders().get_payments(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_paying_settled_order_rejected() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_order(&db, &fx, 3_000, 30).await;

        db.payments().pay_order(&order.id, 3_000, PaymentMethod::Cash).await.unwrap();
        let err = db
            .payments()
            .pay_order(&order.id, 100, PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Ledger(LedgerError::OverpaymentNotAllowed {
                outstanding_cents: 0,
                ..
            })
        ));
    }

    /// Two credit orders of 100.00 (due sooner) and 80.00; paying 120.00
    /// settles the older fully and leaves 60.00 on the newer.
    #[tokio::test]
    async fn test_balance_payment_allocates_oldest_first() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let older = credit_order(&db, &fx, 10_000, 7).await;
        let newer = credit_order(&db, &fx, 8_000, 30).await;

        let (payment, allocations) = db
            .payments()
            .pay_balance(&fx.customer.id, 12_000, PaymentMethod::Cash)
            .await
            .unwrap();

        assert_eq!(payment.order_id, None);
        assert_eq!(payment.amount_cents, 12_000);

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].order_id, older.id);
        assert_eq!(allocations[0].amount_cents, 10_000);
        assert!(allocations[0].settles_order);
        assert_eq!(allocations[1].order_id, newer.id);
        assert_eq!(allocations[1].amount_cents, 2_000);

        let older_after = db.orders().get_by_id(&older.id).await.unwrap();
        assert_eq!(older_after.payment_status, PaymentStatus::Paid);
        let newer_after = db.orders().get_by_id(&newer.id).await.unwrap();
        assert_eq!(newer_after.credit_outstanding_cents, 6_000);
        assert_eq!(newer_after.payment_status, PaymentStatus::PartiallyPaid);

        assert_eq!(
            db.customers().get_by_id(&fx.customer.id).await.unwrap().current_balance_cents,
            6_000
        );

        // Exactly one payment row exists, unattached to any order
        let all = db.orders().payments_for_customer(&fx.customer.id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].order_id, None);
    }

    #[tokio::test]
    async fn test_balance_overpayment_rejected_without_mutation() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_order(&db, &fx, 4_000, 7).await;

        let err = db
            .payments()
            .pay_balance(&fx.customer.id, 4_001, PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Ledger(LedgerError::OverpaymentNotAllowed {
                outstanding_cents: 4_000,
                amount_cents: 4_001
            })
        ));

        let after = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(after.credit_outstanding_cents, 4_000);
        assert!(db
            .orders()
            .payments_for_customer(&fx.customer.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_order(&db, &fx, 1_000, 7).await;

        assert!(db
            .payments()
            .pay_order(&order.id, 0, PaymentMethod::Cash)
            .await
            .is_err());
        assert!(db
            .payments()
            .pay_balance(&fx.customer.id, -500, PaymentMethod::Cash)
            .await
            .is_err());
    }
}
