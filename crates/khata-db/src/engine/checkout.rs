//! # Checkout Engine
//!
//! Commits a planned checkout as one atomic transaction.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    1. Load customer, verify location                                    │
//! │    2. plan_checkout()  ← pure rules from khata-core                     │
//! │    3. Per line: snapshot product, guarded stock decrement + audit row   │
//! │    4. Insert order (SO-YYYYMMDD-NNNN) and its items                     │
//! │    5. Credit portion: guarded balance increment                         │
//! │       (re-asserts the limit against concurrent checkouts)               │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure → ROLLBACK: no stock moved, no order exists, no balance    │
//! │  changed. A cart whose 3rd line is short leaves lines 1 and 2 intact.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::engine::begin_write;
use crate::engine::stock::{apply_delta, ensure_location_exists};
use crate::error::DbResult;
use khata_core::checkout::{plan_checkout, CartLine, CreditTerms, Tender};
use khata_core::{Customer, LedgerError, Product, SalesOrder};

/// Everything a till submits for one sale.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_id: String,
    /// Location the goods leave from.
    pub location_id: String,
    pub lines: Vec<CartLine>,
    pub tender: Tender,
    /// Required when the tender carries a credit portion.
    pub terms: Option<CreditTerms>,
    /// Recorded as the actor on the stock movements.
    pub cashier: String,
}

/// Transactional engine that turns a cart into a committed sales order.
#[derive(Debug, Clone)]
pub struct CheckoutEngine {
    pool: SqlitePool,
}

impl CheckoutEngine {
    /// Creates a new CheckoutEngine.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutEngine { pool }
    }

    /// Processes a checkout atomically.
    ///
    /// ## Errors (all roll back completely)
    /// - `Ledger(Validation)` - empty cart, bad quantity, missing due date
    /// - `Ledger(PaymentMismatch)` - split doesn't cover the subtotal
    /// - `Ledger(InsufficientStock)` - any line short at the location
    /// - `Ledger(CreditLimitExceeded)` - credit portion doesn't fit
    pub async fn checkout(&self, request: CheckoutRequest) -> DbResult<SalesOrder> {
        let mut tx = begin_write(&self.pool).await?;

        let customer = load_customer(&mut tx, &request.customer_id).await?;
        ensure_location_exists(&mut tx, &request.location_id).await?;

        let plan = plan_checkout(&request.lines, request.tender, &customer, request.terms)
            .map_err(crate::error::DbError::from)?;

        // Snapshot products before moving stock so an unknown product fails
        // ahead of any movement
        let mut snapshots: Vec<Product> = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            snapshots.push(load_active_product(&mut tx, &line.product_id).await?);
        }

        for line in &request.lines {
            apply_delta(
                &mut tx,
                &line.product_id,
                &request.location_id,
                -line.quantity,
                "sale",
                &request.cashier,
            )
            .await?;
        }

        let now = Utc::now();
        let order = SalesOrder {
            id: Uuid::new_v4().to_string(),
            order_number: next_order_number(&mut tx, now).await?,
            customer_id: customer.id.clone(),
            location_id: request.location_id.clone(),
            subtotal_cents: plan.subtotal_cents,
            amount_paid_cents: plan.cash_cents,
            amount_to_credit_cents: plan.credit_cents,
            credit_outstanding_cents: plan.credit_cents,
            payment_status: plan.payment_status,
            due_date: plan.due_date,
            allowed_until: plan.allowed_until,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sales_orders
                (id, order_number, customer_id, location_id, subtotal_cents,
                 amount_paid_cents, amount_to_credit_cents, credit_outstanding_cents,
                 payment_status, due_date, allowed_until, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.customer_id)
        .bind(&order.location_id)
        .bind(order.subtotal_cents)
        .bind(order.amount_paid_cents)
        .bind(order.amount_to_credit_cents)
        .bind(order.credit_outstanding_cents)
        .bind(order.payment_status)
        .bind(order.due_date)
        .bind(order.allowed_until)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (line, product) in request.lines.iter().zip(&snapshots) {
            sqlx::query(
                r#"
                INSERT INTO sales_order_items
                    (id, order_id, product_id, sku_snapshot, name_snapshot,
                     unit_price_cents, quantity, line_total_cents, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&order.id)
            .bind(&line.product_id)
            .bind(&product.sku)
            .bind(&product.name)
            .bind(line.unit_price_cents)
            .bind(line.quantity)
            .bind(line.unit_price_cents * line.quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        if plan.credit_cents > 0 {
            // The plan already checked the limit against a snapshot of the
            // customer; this guard re-asserts it against whatever committed
            // since that read
            let result = sqlx::query(
                r#"
                UPDATE customers
                SET current_balance_cents = current_balance_cents + ?1, updated_at = ?2
                WHERE id = ?3
                  AND current_balance_cents + ?1 <= credit_limit_cents
                "#,
            )
            .bind(plan.credit_cents)
            .bind(now)
            .bind(&customer.id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let fresh = load_customer(&mut tx, &customer.id).await?;
                return Err(LedgerError::CreditLimitExceeded {
                    customer_id: customer.id.clone(),
                    credit_limit_cents: fresh.credit_limit_cents,
                    current_balance_cents: fresh.current_balance_cents,
                    requested_cents: plan.credit_cents,
                }
                .into());
            }
        }

        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            customer_id = %order.customer_id,
            subtotal = order.subtotal_cents,
            cash = order.amount_paid_cents,
            credit = order.amount_to_credit_cents,
            "Checkout committed"
        );
        Ok(order)
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) async fn load_customer(
    tx: &mut Transaction<'_, Sqlite>,
    customer_id: &str,
) -> DbResult<Customer> {
    sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?1")
        .bind(customer_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::CustomerNotFound(customer_id.to_string()).into())
}

async fn load_active_product(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: &str,
) -> DbResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1 AND is_active = 1")
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::ProductNotFound(product_id.to_string()).into())
}

/// Allocates the next `SO-YYYYMMDD-NNNN` business number.
///
/// Counting happens inside the checkout transaction, and the UNIQUE
/// constraint on order_number catches a same-instant race.
async fn next_order_number(
    tx: &mut Transaction<'_, Sqlite>,
    now: chrono::DateTime<Utc>,
) -> DbResult<String> {
    let prefix = format!("SO-{}-", now.format("%Y%m%d"));
    let today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sales_orders WHERE order_number LIKE ?1 || '%'",
    )
    .bind(&prefix)
    .fetch_one(&mut **tx)
    .await?;

    Ok(format!("{}{:04}", prefix, today + 1))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::test_support::{fixture, test_db};
    use khata_core::PaymentStatus;

    fn cash_request(fx: &crate::test_support::Fixture, quantity: i64) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: fx.customer.id.clone(),
            location_id: fx.store.id.clone(),
            lines: vec![CartLine {
                product_id: fx.product.id.clone(),
                quantity,
                unit_price_cents: fx.product.selling_price_cents,
            }],
            tender: Tender::cash(quantity * fx.product.selling_price_cents),
            terms: None,
            cashier: "till-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cash_checkout_moves_stock_and_settles() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let order = db.checkout().checkout(cash_request(&fx, 4)).await.unwrap();

        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.credit_outstanding_cents, 0);
        assert!(order.order_number.starts_with("SO-"));

        let level = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(level.current_quantity, 6);

        // The sale left an audit row, and replay still reconciles
        let history = db.stock().history(&fx.product.id, &fx.store.id, 5).await.unwrap();
        assert_eq!(history[0].delta, -4);
        assert_eq!(history[0].reason, "sale");
        assert_eq!(
            db.stock().replay_quantity(&fx.product.id, &fx.store.id).await.unwrap(),
            6
        );

        let items = db.orders().get_items(&order.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku_snapshot, fx.product.sku);
        assert_eq!(items[0].line_total_cents, order.subtotal_cents);

        // Cash sale leaves the credit balance untouched
        let customer = db.customers().get_by_id(&fx.customer.id).await.unwrap();
        assert_eq!(customer.current_balance_cents, 0);
    }

    #[tokio::test]
    async fn test_credit_checkout_raises_balance() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let total = 2 * fx.product.selling_price_cents;
        let order = db
            .checkout()
            .checkout(CheckoutRequest {
                customer_id: fx.customer.id.clone(),
                location_id: fx.store.id.clone(),
                lines: vec![CartLine {
                    product_id: fx.product.id.clone(),
                    quantity: 2,
                    unit_price_cents: fx.product.selling_price_cents,
                }],
                tender: Tender::split(total / 2, total - total / 2),
                terms: Some(CreditTerms::due_on(Utc::now() + chrono::Duration::days(14))),
                cashier: "till-1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.credit_outstanding_cents, total - total / 2);
        assert!(order.due_date.is_some());

        let customer = db.customers().get_by_id(&fx.customer.id).await.unwrap();
        assert_eq!(customer.current_balance_cents, order.credit_outstanding_cents);
    }

    /// Insufficient stock on the second line must leave the first line's
    /// stock untouched and create no order, items, or adjustments.
    #[tokio::test]
    async fn test_partial_failure_rolls_back_everything() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let second = db
            .products()
            .insert(crate::repository::NewProduct {
                sku: "SUGAR-5KG".to_string(),
                name: "Sugar 5kg".to_string(),
                unit_cost_cents: None,
                selling_price_cents: 80_000,
            })
            .await
            .unwrap();
        // No stock seeded for the second product

        let err = db
            .checkout()
            .checkout(CheckoutRequest {
                customer_id: fx.customer.id.clone(),
                location_id: fx.store.id.clone(),
                lines: vec![
                    CartLine {
                        product_id: fx.product.id.clone(),
                        quantity: 3,
                        unit_price_cents: fx.product.selling_price_cents,
                    },
                    CartLine {
                        product_id: second.id.clone(),
                        quantity: 1,
                        unit_price_cents: second.selling_price_cents,
                    },
                ],
                tender: Tender::cash(
                    3 * fx.product.selling_price_cents + second.selling_price_cents,
                ),
                terms: None,
                cashier: "till-1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Ledger(LedgerError::InsufficientStock { .. })
        ));

        // First line's decrement was rolled back
        let level = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(level.current_quantity, 10);
        assert!(db
            .stock()
            .history(&fx.product.id, &fx.store.id, 10)
            .await
            .unwrap()
            .iter()
            .all(|a| a.reason != "sale"));
        assert!(db
            .orders()
            .list_for_customer(&fx.customer.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_oversell_rejected() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let err = db.checkout().checkout(cash_request(&fx, 11)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Ledger(LedgerError::InsufficientStock {
                available: 10,
                requested: 11,
                ..
            })
        ));
    }

    /// Two checkouts race for 10 units, asking 7 each: exactly one commits.
    #[tokio::test]
    async fn test_concurrent_checkouts_never_oversell() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let engine = db.checkout();
        let first = engine.checkout(cash_request(&fx, 7));
        let second = engine.checkout(cash_request(&fx, 7));
        let (a, b) = tokio::join!(first, second);

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(
            loser,
            DbError::Ledger(LedgerError::InsufficientStock { .. })
        ));

        let level = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(level.current_quantity, 3);
    }

    /// Sixteen tills checkout one unit each over an eight-connection
    /// file-backed pool. Every sale must commit: competing writers queue
    /// on the busy timeout rather than failing a deferred lock upgrade.
    #[tokio::test]
    async fn test_many_tills_on_file_backed_pool() {
        let path = std::env::temp_dir().join(format!("khata-tills-{}.db", Uuid::new_v4()));
        let db = crate::Database::new(crate::DbConfig::new(&path).max_connections(8))
            .await
            .unwrap();
        let fx = fixture(&db).await;
        // fixture seeds 10; raise to 999 so stock never gates a sale
        db.stock()
            .adjust(&fx.product.id, &fx.store.id, 989, "restock", "seed")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = db.checkout();
            let request = cash_request(&fx, 1);
            handles.push(tokio::spawn(async move { engine.checkout(request).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let level = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(level.current_quantity, 999 - 16);
        assert_eq!(
            db.stock().replay_quantity(&fx.product.id, &fx.store.id).await.unwrap(),
            999 - 16
        );

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_order_numbers_increment_within_day() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let first = db.checkout().checkout(cash_request(&fx, 1)).await.unwrap();
        let second = db.checkout().checkout(cash_request(&fx, 1)).await.unwrap();

        let prefix = format!("SO-{}-", Utc::now().format("%Y%m%d"));
        assert_eq!(first.order_number, format!("{prefix}0001"));
        assert_eq!(second.order_number, format!("{prefix}0002"));
    }

    /// A product scanned onto two lines is rejected before anything moves;
    /// the till has to merge quantities into one line. Order items
    /// therefore carry exactly one price snapshot per product, which the
    /// returns engine relies on when it resolves refund prices.
    #[tokio::test]
    async fn test_duplicate_product_lines_rejected() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let mut request = cash_request(&fx, 1);
        let repeat = request.lines[0].clone();
        request.lines.push(repeat);
        request.tender = Tender::cash(2 * fx.product.selling_price_cents);

        let err = db.checkout().checkout(request).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Ledger(LedgerError::Validation(
                khata_core::ValidationError::Duplicate { .. }
            ))
        ));

        let level = db.stock().level(&fx.product.id, &fx.store.id).await.unwrap();
        assert_eq!(level.current_quantity, 10);
    }

    #[tokio::test]
    async fn test_inactive_product_rejected() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        db.products().soft_delete(&fx.product.id).await.unwrap();

        let err = db.checkout().checkout(cash_request(&fx, 1)).await.unwrap_err();
        assert!(matches!(err, DbError::Ledger(LedgerError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_customer_rejected() {
        let db = test_db().await;
        let fx = fixture(&db).await;

        let mut request = cash_request(&fx, 1);
        request.customer_id = "ghost".to_string();
        let err = db.checkout().checkout(request).await.unwrap_err();
        assert!(matches!(err, DbError::Ledger(LedgerError::CustomerNotFound(_))));
    }
}
