//! # Stock Ledger
//!
//! Quantity tracking per (product, location) with an append-only audit
//! trail.
//!
//! ## Invariant Enforcement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every mutation is a guarded single-statement update:                   │
//! │                                                                         │
//! │  UPDATE stock_levels                                                    │
//! │  SET current_quantity = current_quantity + :delta                       │
//! │  WHERE product_id = :p AND location_id = :l                             │
//! │    AND current_quantity + :delta >= 0      ◄── the guard                │
//! │                                                                         │
//! │  rows_affected == 0  →  InsufficientStock, transaction rolls back       │
//! │                                                                         │
//! │  Two checkouts racing for the last units: whichever commits second      │
//! │  finds the guard false and fails cleanly. The CHECK constraint in the   │
//! │  schema backs this up.                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every successful mutation appends one `stock_adjustments` row in the
//! same transaction. Summing `delta` from zero for a pair reproduces
//! `current_quantity`; `replay_quantity` exposes that check for audits.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::begin_write;
use crate::error::{DbError, DbResult};
use khata_core::validation::{validate_name, validate_quantity};
use khata_core::{LedgerError, StockAdjustment, StockLevel, StockSummary};

/// Transactional engine for stock movements and stock views.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
}

impl StockLedger {
    /// Creates a new StockLedger.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedger { pool }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Applies a relative quantity change at a location.
    ///
    /// Positive deltas create the level row lazily; negative deltas fail
    /// with `InsufficientStock` when they would drive the quantity below
    /// zero. Returns the level after the change.
    ///
    /// ## Arguments
    /// * `delta` - Signed change; magnitude 1..=999, never zero
    /// * `reason` - Why the stock moved ("restock", "damage", free text)
    /// * `actor` - Who moved it (cashier id, "system")
    pub async fn adjust(
        &self,
        product_id: &str,
        location_id: &str,
        delta: i64,
        reason: &str,
        actor: &str,
    ) -> DbResult<StockLevel> {
        validate_quantity(delta.abs()).map_err(LedgerError::from)?;
        validate_name(reason).map_err(LedgerError::from)?;
        validate_name(actor).map_err(LedgerError::from)?;

        let mut tx = begin_write(&self.pool).await?;
        ensure_product_exists(&mut tx, product_id).await?;
        ensure_location_exists(&mut tx, location_id).await?;
        apply_delta(&mut tx, product_id, location_id, delta, reason, actor).await?;
        let level = level_in_tx(&mut tx, product_id, location_id).await?;
        tx.commit().await?;

        info!(
            product_id = %product_id,
            location_id = %location_id,
            delta = delta,
            quantity = level.current_quantity,
            "Stock adjusted"
        );
        Ok(level)
    }

    /// Sets the absolute quantity at a location (physical recount).
    ///
    /// Recorded as one adjustment carrying the difference, so the audit
    /// trail stays replayable.
    pub async fn set_absolute(
        &self,
        product_id: &str,
        location_id: &str,
        quantity: i64,
        actor: &str,
    ) -> DbResult<StockLevel> {
        if quantity < 0 {
            return Err(LedgerError::from(
                khata_core::ValidationError::MustBeNonNegative {
                    field: "quantity".to_string(),
                },
            )
            .into());
        }
        validate_name(actor).map_err(LedgerError::from)?;

        let mut tx = begin_write(&self.pool).await?;
        ensure_product_exists(&mut tx, product_id).await?;
        ensure_location_exists(&mut tx, location_id).await?;

        let current: Option<i64> = sqlx::query_scalar(
            "SELECT current_quantity FROM stock_levels WHERE product_id = ?1 AND location_id = ?2",
        )
        .bind(product_id)
        .bind(location_id)
        .fetch_optional(&mut *tx)
        .await?;

        let delta = quantity - current.unwrap_or(0);
        if delta != 0 {
            apply_delta(&mut tx, product_id, location_id, delta, "recount", actor).await?;
        }
        let level = level_in_tx(&mut tx, product_id, location_id).await?;
        tx.commit().await?;

        info!(
            product_id = %product_id,
            location_id = %location_id,
            quantity = quantity,
            "Stock recounted"
        );
        Ok(level)
    }

    /// Sets the advisory reorder bounds for a (product, location) pair.
    ///
    /// Bounds never gate movements; they only feed `below_minimum`.
    pub async fn set_reorder_levels(
        &self,
        product_id: &str,
        location_id: &str,
        min_level: Option<i64>,
        max_level: Option<i64>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE stock_levels
            SET min_level = ?1, max_level = ?2, updated_at = ?3
            WHERE product_id = ?4 AND location_id = ?5
            "#,
        )
        .bind(min_level)
        .bind(max_level)
        .bind(Utc::now())
        .bind(product_id)
        .bind(location_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(
                "StockLevel",
                format!("{product_id}@{location_id}"),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Gets the level for one (product, location) pair.
    ///
    /// A pair with no row yet reads as quantity zero.
    pub async fn level(&self, product_id: &str, location_id: &str) -> DbResult<StockLevel> {
        let level = sqlx::query_as::<_, StockLevel>(
            "SELECT * FROM stock_levels WHERE product_id = ?1 AND location_id = ?2",
        )
        .bind(product_id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(level.unwrap_or(StockLevel {
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            current_quantity: 0,
            min_level: None,
            max_level: None,
            updated_at: Utc::now(),
        }))
    }

    /// Total quantity of a product summed over all locations.
    pub async fn total_for(&self, product_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(current_quantity), 0) FROM stock_levels WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    /// Per-location breakdown plus the total for one product.
    pub async fn summary(&self, product_id: &str) -> DbResult<StockSummary> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT * FROM stock_levels
            WHERE product_id = ?1
            ORDER BY location_id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let total_quantity = levels.iter().map(|l| l.current_quantity).sum();
        Ok(StockSummary {
            product_id: product_id.to_string(),
            total_quantity,
            levels,
        })
    }

    /// Lists levels that have fallen below their advisory minimum.
    pub async fn below_minimum(&self) -> DbResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT * FROM stock_levels
            WHERE min_level IS NOT NULL AND current_quantity < min_level
            ORDER BY product_id, location_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(levels)
    }

    /// Adjustment history for a pair, most recent first.
    pub async fn history(
        &self,
        product_id: &str,
        location_id: &str,
        limit: u32,
    ) -> DbResult<Vec<StockAdjustment>> {
        let adjustments = sqlx::query_as::<_, StockAdjustment>(
            r#"
            SELECT * FROM stock_adjustments
            WHERE product_id = ?1 AND location_id = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            "#,
        )
        .bind(product_id)
        .bind(location_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(adjustments)
    }

    /// Replays all adjustment deltas for a pair from zero.
    ///
    /// An audit passes when this equals `level().current_quantity`.
    pub async fn replay_quantity(&self, product_id: &str, location_id: &str) -> DbResult<i64> {
        let replayed: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(delta), 0) FROM stock_adjustments
            WHERE product_id = ?1 AND location_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(location_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(replayed)
    }
}

// =============================================================================
// Transaction primitives (shared with the other engines)
// =============================================================================

/// Applies one signed quantity change inside an open transaction and
/// appends the matching audit row.
///
/// This is THE stock mutation primitive: checkout and returns route their
/// per-line movements through here so the guard and the audit append can
/// never diverge.
pub(crate) async fn apply_delta(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: &str,
    location_id: &str,
    delta: i64,
    reason: &str,
    actor: &str,
) -> DbResult<i64> {
    let now = Utc::now();

    if delta >= 0 {
        // Level rows are created lazily on the first inbound movement
        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, location_id, current_quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (product_id, location_id) DO UPDATE SET
                current_quantity = current_quantity + excluded.current_quantity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product_id)
        .bind(location_id)
        .bind(delta)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    } else {
        // Guarded decrement: the WHERE clause is the invariant
        let result = sqlx::query(
            r#"
            UPDATE stock_levels
            SET current_quantity = current_quantity + ?1, updated_at = ?2
            WHERE product_id = ?3 AND location_id = ?4
              AND current_quantity + ?1 >= 0
            "#,
        )
        .bind(delta)
        .bind(now)
        .bind(product_id)
        .bind(location_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            let available: i64 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(
                    (SELECT current_quantity FROM stock_levels
                     WHERE product_id = ?1 AND location_id = ?2),
                    0)
                "#,
            )
            .bind(product_id)
            .bind(location_id)
            .fetch_one(&mut **tx)
            .await?;

            debug!(
                product_id = %product_id,
                location_id = %location_id,
                available = available,
                requested = -delta,
                "Stock guard rejected decrement"
            );
            return Err(LedgerError::InsufficientStock {
                product_id: product_id.to_string(),
                location_id: location_id.to_string(),
                available,
                requested: -delta,
            }
            .into());
        }
    }

    let resulting: i64 = sqlx::query_scalar(
        "SELECT current_quantity FROM stock_levels WHERE product_id = ?1 AND location_id = ?2",
    )
    .bind(product_id)
    .bind(location_id)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO stock_adjustments
            (id, product_id, location_id, delta, resulting_quantity, reason, actor, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product_id)
    .bind(location_id)
    .bind(delta)
    .bind(resulting)
    .bind(reason)
    .bind(actor)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(resulting)
}

pub(crate) async fn ensure_product_exists(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: &str,
) -> DbResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?1")
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(LedgerError::ProductNotFound(product_id.to_string()).into());
    }
    Ok(())
}

pub(crate) async fn ensure_location_exists(
    tx: &mut Transaction<'_, Sqlite>,
    location_id: &str,
) -> DbResult<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM locations WHERE id = ?1")
        .bind(location_id)
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(LedgerError::LocationNotFound(location_id.to_string()).into());
    }
    Ok(())
}

async fn level_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: &str,
    location_id: &str,
) -> DbResult<StockLevel> {
    let level = sqlx::query_as::<_, StockLevel>(
        "SELECT * FROM stock_levels WHERE product_id = ?1 AND location_id = ?2",
    )
    .bind(product_id)
    .bind(location_id)
    .fetch_optional(&mut **tx)
    .await?;

    // A recount to zero on a pair that never moved leaves no row behind
    Ok(level.unwrap_or(StockLevel {
        product_id: product_id.to_string(),
        location_id: location_id.to_string(),
        current_quantity: 0,
        min_level: None,
        max_level: None,
        updated_at: Utc::now(),
    }))
}

// =============================================================================
// Unit Tests
// =============================================================================
