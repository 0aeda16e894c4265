//! # Order Repository
//!
//! Read-side access to sales orders, their lines, and their payments,
//! plus the overdue sweep.
//!
//! Orders are created only by the checkout engine and their money columns
//! are mutated only by the payment and returns engines. The one write here
//! is `mark_overdue`, which flips status without touching any amount.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use khata_core::allocation::OutstandingOrder;
use khata_core::{OrderItem, Payment, SalesOrder};

/// Repository for sales order reads and the overdue lifecycle.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by its UUID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<SalesOrder> {
        sqlx::query_as::<_, SalesOrder>("SELECT * FROM sales_orders WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }

    /// Gets an order by its business number (`SO-YYYYMMDD-NNNN`).
    pub async fn get_by_number(&self, order_number: &str) -> DbResult<SalesOrder> {
        sqlx::query_as::<_, SalesOrder>(
            "SELECT * FROM sales_orders WHERE order_number = ?1",
        )
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_number))
    }

    /// Lists the line items of an order.
    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT * FROM sales_order_items
            WHERE order_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Lists a customer's orders, most recent first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<SalesOrder>> {
        let orders = sqlx::query_as::<_, SalesOrder>(
            r#"
            SELECT * FROM sales_orders
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// Snapshots a customer's unpaid credit orders in allocation order:
    /// due date ascending, then creation time.
    ///
    /// The payment engine calls this inside its transaction and feeds the
    /// result to the oldest-first allocator.
    pub async fn outstanding_for_customer(
        &self,
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
        .fetch_all(&self.pool)
        .await?;

        Ok(orders
            .into_iter()
            .map(|o| OutstandingOrder {
                order_id: o.id,
                // Outstanding credit always carries a due date; a legacy
                // row without one sorts by its creation time.
                due_date: o.due_date.unwrap_or(o.created_at),
                created_at: o.created_at,
                outstanding_cents: o.credit_outstanding_cents,
            })
            .collect())
    }

    /// Lists the payments recorded against an order.
    pub async fn get_payments(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Lists all payments of a customer, including whole-balance payments
    /// (those carry a NULL order_id).
    pub async fn payments_for_customer(&self, customer_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE customer_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Flips orders past their grace window to `overdue`.
    ///
    /// An order qualifies when it still has outstanding credit and `now`
    /// is past `allowed_until`. Settled orders never become overdue, and
    /// an overdue order goes back to the normal flow the moment a payment
    /// or return clears it. Returns how many orders were flipped.
    pub async fn mark_overdue(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sales_orders
            SET payment_status = 'overdue', updated_at = ?1
            WHERE credit_outstanding_cents > 0
              AND allowed_until IS NOT NULL
              AND allowed_until < ?1
              AND payment_status IN ('pending', 'partially_paid')
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let flipped = result.rows_affected();
        if flipped > 0 {
            info!(count = flipped, "Marked orders overdue");
        } else {
            debug!("No orders past their grace window");
        }
        Ok(flipped)
    }

    /// Lists orders currently past their grace window with credit unpaid.
    pub async fn list_overdue(&self, now: DateTime<Utc>) -> DbResult<Vec<SalesOrder>> {
        let orders = sqlx::query_as::<_, SalesOrder>(
            r#"
            SELECT * FROM sales_orders
            WHERE credit_outstanding_cents > 0
              AND allowed_until IS NOT NULL
              AND allowed_until < ?1
            ORDER BY due_date ASC, created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
