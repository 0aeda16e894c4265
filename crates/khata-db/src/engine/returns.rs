//! # Returns Engine
//!
//! Processes returns against a sales order: restock, snapshot-priced
//! refund, and debt cancellation, all in one transaction.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    1. Load order + lines + quantities already returned                  │
//! │    2. plan_return()  ← availability, over-return, snapshot pricing      │
//! │    3. Insert return + return_items (immutable records)                  │
//! │    4. Per line: stock increment + audit row at the restock location     │
//! │    5. Debt first: outstanding -= min(refund, outstanding),              │
//! │       balance follows; status → paid when outstanding hits 0            │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  The cash remainder of the refund is reported to the caller and NOT     │
//! │  persisted; handing over the money is the till's job.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::engine::begin_write;
use crate::engine::payment::{apply_to_order, reduce_balance};
use crate::engine::stock::{apply_delta, ensure_location_exists};
use crate::error::DbResult;
use khata_core::returns::{plan_return, OrderedLine, ReturnRequestLine};
use khata_core::{LedgerError, OrderItem, RefundableItem, Return, SalesOrder};

/// Everything the counter submits for one return.
#[derive(Debug, Clone)]
pub struct ReturnRequest {
    pub order_id: String,
    pub lines: Vec<ReturnRequestLine>,
    /// Where the goods go back into stock. Defaults to the location the
    /// order sold from.
    pub restock_location_id: Option<String>,
    /// Recorded as the actor on the stock movements.
    pub actor: String,
}

/// The committed result of a return.
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub record: Return,
    /// Refund remainder after debt cancellation, owed to the customer in
    /// cash or as a credit note. Reported, not persisted.
    pub cash_refund_cents: i64,
}

/// Transactional engine for returns.
#[derive(Debug, Clone)]
pub struct ReturnsEngine {
    pool: SqlitePool,
}

impl ReturnsEngine {
    /// Creates a new ReturnsEngine.
    pub fn new(pool: SqlitePool) -> Self {
        ReturnsEngine { pool }
    }

    /// Processes a return atomically.
    ///
    /// ## Errors (all roll back completely)
    /// - `Ledger(OrderNotFound)` - unknown order
    /// - `Ledger(ProductNotFound)` - a requested product is not on the order
    /// - `Ledger(OverReturn)` - any line exceeds what is still returnable;
    ///   the WHOLE request is rejected
    pub async fn process_return(&self, request: ReturnRequest) -> DbResult<ReturnOutcome> {
        let mut tx = begin_write(&self.pool).await?;

        let order = load_order(&mut tx, &request.order_id).await?;
        let ordered = ordered_lines(&mut tx, &order.id).await?;
        let plan = plan_return(&ordered, &request.lines, order.credit_outstanding_cents)
            .map_err(crate::error::DbError::from)?;

        let restock_location_id = request
            .restock_location_id
            .unwrap_or_else(|| order.location_id.clone());
        ensure_location_exists(&mut tx, &restock_location_id).await?;

        let now = Utc::now();
        let record = Return {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            restock_location_id: restock_location_id.clone(),
            refund_cents: plan.refund_cents,
            outstanding_reduced_cents: plan.outstanding_reduction_cents,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO returns
                (id, order_id, restock_location_id, refund_cents,
                 outstanding_reduced_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&record.id)
        .bind(&record.order_id)
        .bind(&record.restock_location_id)
        .bind(record.refund_cents)
        .bind(record.outstanding_reduced_cents)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;

        for line in &plan.lines {
            sqlx::query(
                r#"
                INSERT INTO return_items
                    (id, return_id, product_id, quantity, unit_price_cents, reason, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&record.id)
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(&line.reason)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            apply_delta(
                &mut tx,
                &line.product_id,
                &restock_location_id,
                line.quantity,
                "return",
                &request.actor,
            )
            .await?;
        }

        if plan.outstanding_reduction_cents > 0 {
            apply_to_order(&mut tx, &order.id, plan.outstanding_reduction_cents, now).await?;
            reduce_balance(
                &mut tx,
                &order.customer_id,
                plan.outstanding_reduction_cents,
                now,
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            order_id = %order.id,
            refund = plan.refund_cents,
            debt_cancelled = plan.outstanding_reduction_cents,
            cash_refund = plan.cash_refund_cents,
            "Return committed"
        );
        Ok(ReturnOutcome {
            record,
            cash_refund_cents: plan.cash_refund_cents,
        })
    }

    /// What can still be returned on an order, per product.
    pub async fn refundable_items(&self, order_id: &str) -> DbResult<Vec<RefundableItem>> {
        // Read-only view: a deferred transaction never writes, so it
        // stays off the write lock
        let mut tx = self.pool.begin().await?;
        let order = load_order(&mut tx, order_id).await?;

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM sales_order_items WHERE order_id = ?1 ORDER BY created_at, id",
        )
        .bind(&order.id)
        .fetch_all(&mut *tx)
        .await?;

        let returned = returned_per_product(&mut tx, &order.id).await?;
        tx.commit().await?;

        // Aggregate per product: the same product may appear on several lines
        let mut out: Vec<RefundableItem> = Vec::new();
        for item in items {
            if let Some(existing) = out.iter_mut().find(|r| r.product_id == item.product_id) {
                existing.quantity_ordered += item.quantity;
            } else {
                out.push(RefundableItem {
                    product_id: item.product_id.clone(),
                    sku: item.sku_snapshot,
                    name: item.name_snapshot,
                    quantity_ordered: item.quantity,
                    quantity_returned: 0,
                    quantity_available: 0,
                    unit_price_cents: item.unit_price_cents,
                });
            }
        }
        for entry in &mut out {
            entry.quantity_returned = returned
                .iter()
                .find(|(pid, _)| pid == &entry.product_id)
                .map(|(_, qty)| *qty)
                .unwrap_or(0);
            entry.quantity_available =
                (entry.quantity_ordered - entry.quantity_returned).max(0);
        }
        Ok(out)
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

async fn load_order(tx: &mut Transaction<'_, Sqlite>, order_id: &str) -> DbResult<SalesOrder> {
    sqlx::query_as::<_, SalesOrder>("SELECT * FROM sales_orders WHERE id = ?1")
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::OrderNotFound(order_id.to_string()).into())
}

/// Quantities already returned against an order, per product.
async fn returned_per_product(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
) -> DbResult<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT ri.product_id, COALESCE(SUM(ri.quantity), 0)
        FROM return_items ri
        JOIN returns r ON r.id = ri.return_id
        WHERE r.order_id = ?1
        GROUP BY ri.product_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows)
}

/// Order lines keyed per product with their prior returns, the input the
/// pure planner expects.
///
/// Checkout admits each product once per cart, so every product resolves
/// to exactly one line and one unit-price snapshot. The fold still sums
/// quantities rather than trusting that uniqueness.
async fn ordered_lines(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
) -> DbResult<Vec<OrderedLine>> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM sales_order_items WHERE order_id = ?1 ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;
    let returned = returned_per_product(tx, order_id).await?;

    let mut lines: Vec<OrderedLine> = Vec::new();
    for item in items {
        if let Some(existing) = lines.iter_mut().find(|l| l.product_id == item.product_id) {
            existing.quantity_ordered += item.quantity;
        } else {
            lines.push(OrderedLine {
                product_id: item.product_id.clone(),
                quantity_ordered: item.quantity,
                quantity_returned: returned
                    .iter()
                    .find(|(pid, _)| pid == &item.product_id)
                    .map(|(_, qty)| *qty)
                    .unwrap_or(0),
                unit_price_cents: item.unit_price_cents,
            });
        }
    }
    Ok(lines)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::checkout::CheckoutRequest;
    use crate::error::DbError;
    use crate::test_support::{fixture, test_db, Fixture};
    use chrono::Duration;
    use khata_core::checkout::{CartLine, CreditTerms, Tender};
    use khata_core::PaymentStatus;

    fn request_line(product_id: &str, quantity: i64) -> ReturnRequestLine {
        ReturnRequestLine {
            product_id: product_id.to_string(),
            quantity,
            reason: Some("damaged".to_string()),
        }
    }

    /// 5 units sold on credit at 10.00 each. Returning 2 restocks them,
    /// cancels 20.00 of debt, and owes no cash.
    async fn credit_sale(db: &crate::Database, fx: &Fixture, quantity: i64) -> SalesOrder {
        db.checkout()
            .checkout(CheckoutRequest {
                customer_id: fx.customer.id.clone(),
                location_id: fx.store.id.clone(),
                lines: vec![CartLine {
                    product_id: fx.product.id.clone(),
                    quantity,
                    unit_price_cents: 1_000,
                }],
                tender: Tender::credit(quantity * 1_000),
                terms: Some(CreditTerms::due_on(Utc::now() + Duration::days(30))),
                cashier: "till-1".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_return_restocks_and_cancels_debt() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_sale(&db, &fx, 5).await;

        let outcome = db
            .returns()
            .process_return(ReturnRequest {
                order_id: order.id.clone(),
                lines: vec![request_line(&fx.product.id, 2)],
                restock_location_id: None,
                actor: "counter".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.record.refund_cents, 2_000);
        assert_eq!(outcome.record.outstanding_reduced_cents, 2_000);
        assert_eq!(outcome.cash_refund_cents, 0);

        // 10 seeded - 5 sold + 2 returned
        let level = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(level.current_quantity, 7);
        let history = db.stock().history(&fx.product.id, &fx.store.id, 5).await.unwrap();
        assert_eq!(history[0].delta, 2);
        assert_eq!(history[0].reason, "return");

        let after = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(after.credit_outstanding_cents, 3_000);
        assert_eq!(after.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(
            db.customers().get_by_id(&fx.customer.id).await.unwrap().current_balance_cents,
            3_000
        );
    }

    #[tokio::test]
    async fn test_returning_everything_settles_the_order() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_sale(&db, &fx, 3).await;

        db.returns()
            .process_return(ReturnRequest {
                order_id: order.id.clone(),
                lines: vec![request_line(&fx.product.id, 3)],
                restock_location_id: None,
                actor: "counter".to_string(),
            })
            .await
            .unwrap();

        let after = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(after.credit_outstanding_cents, 0);
        assert_eq!(after.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_refund_beyond_debt_is_cash() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_sale(&db, &fx, 4).await;

        // Pay 3000 of the 4000 first; returning 4 then refunds 4000 of
        // which only 1000 is still debt
        db.payments()
            .pay_order(&order.id, 3_000, khata_core::PaymentMethod::Cash)
            .await
            .unwrap();

        let outcome = db
            .returns()
            .process_return(ReturnRequest {
                order_id: order.id.clone(),
                lines: vec![request_line(&fx.product.id, 4)],
                restock_location_id: None,
                actor: "counter".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.record.refund_cents, 4_000);
        assert_eq!(outcome.record.outstanding_reduced_cents, 1_000);
        assert_eq!(outcome.cash_refund_cents, 3_000);

        assert_eq!(
            db.customers().get_by_id(&fx.customer.id).await.unwrap().current_balance_cents,
            0
        );
    }

    #[tokio::test]
    async fn test_over_return_rejects_whole_request() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_sale(&db, &fx, 5).await;

        db.returns()
            .process_return(ReturnRequest {
                order_id: order.id.clone(),
                lines: vec![request_line(&fx.product.id, 3)],
                restock_location_id: None,
                actor: "counter".to_string(),
            })
            .await
            .unwrap();

        // Only 2 left returnable
        let err = db
            .returns()
            .process_return(ReturnRequest {
                order_id: order.id.clone(),
                lines: vec![request_line(&fx.product.id, 3)],
                restock_location_id: None,
                actor: "counter".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Ledger(LedgerError::OverReturn {
                available: 2,
                requested: 3,
                ..
            })
        ));

        // The rejected request changed nothing
        let level = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(level.current_quantity, 8); // 10 - 5 + 3
        let after = db.orders().get_by_id(&order.id).await.unwrap();
        assert_eq!(after.credit_outstanding_cents, 2_000);
    }

    #[tokio::test]
    async fn test_restock_to_other_location() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_sale(&db, &fx, 2).await;

        db.returns()
            .process_return(ReturnRequest {
                order_id: order.id.clone(),
                lines: vec![request_line(&fx.product.id, 2)],
                restock_location_id: Some(fx.warehouse.id.clone()),
                actor: "counter".to_string(),
            })
            .await
            .unwrap();

        let store = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(store.current_quantity, 8);
        let warehouse = db.stock().level(&fx.product.id, &fx.warehouse.id).await.unwrap();
        assert_eq!(warehouse.current_quantity, 2);
    }

    #[tokio::test]
    async fn test_refundable_items_tracks_availability() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_sale(&db, &fx, 5).await;
        let engine = db.returns();

        let before = engine.refundable_items(&order.id).await.unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].quantity_available, 5);
        assert_eq!(before[0].sku, fx.product.sku);

        engine
            .process_return(ReturnRequest {
                order_id: order.id.clone(),
                lines: vec![request_line(&fx.product.id, 3)],
                restock_location_id: None,
                actor: "counter".to_string(),
            })
            .await
            .unwrap();

        let after = engine.refundable_items(&order.id).await.unwrap();
        assert_eq!(after[0].quantity_returned, 3);
        assert_eq!(after[0].quantity_available, 2);
    }

    #[tokio::test]
    async fn test_product_off_the_order_rejected() {
        let db = test_db().await;
        let fx = fixture(&db).await;
        let order = credit_sale(&db, &fx, 2).await;

        let err = db
            .returns()
            .process_return(ReturnRequest {
                order_id: order.id,
                lines: vec![request_line("ghost", 1)],
                restock_location_id: None,
                actor: "counter".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Ledger(LedgerError::ProductNotFound(_))));
    }
}
