//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! Products are soft-deleted (`is_active = 0`) rather than removed, because
//! order lines and stock adjustments keep referencing them forever.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use khata_core::validation::{validate_name, validate_price_cents, validate_sku};
use khata_core::Product;

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub unit_cost_cents: Option<i64>,
    pub selling_price_cents: i64,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
/// let product = repo.insert(NewProduct { .. }).await?;
/// let found = repo.get_by_sku("ATTA-10KG").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product.
    ///
    /// ## Errors
    /// - `Ledger(Validation)` for a bad SKU, name, or price
    /// - `UniqueViolation` if the SKU already exists
    pub async fn insert(&self, input: NewProduct) -> DbResult<Product> {
        validate_sku(&input.sku).map_err(khata_core::LedgerError::from)?;
        validate_name(&input.name).map_err(khata_core::LedgerError::from)?;
        validate_price_cents(input.selling_price_cents)
            .map_err(khata_core::LedgerError::from)?;

        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: input.sku,
            name: input.name,
            unit_cost_cents: input.unit_cost_cents,
            selling_price_cents: input.selling_price_cents,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products
                (id, sku, name, unit_cost_cents, selling_price_cents, is_active,
                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_cost_cents)
        .bind(product.selling_price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its UUID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Gets a product by its business SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE sku = ?1")
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", sku))
    }

    /// Lists active products sorted by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_active = 1
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Updates the selling price of a product.
    ///
    /// Existing order lines are unaffected: they carry price snapshots.
    pub async fn update_price(&self, id: &str, selling_price_cents: i64) -> DbResult<()> {
        validate_price_cents(selling_price_cents).map_err(khata_core::LedgerError::from)?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET selling_price_cents = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(selling_price_cents)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Soft-deletes a product (sets `is_active = 0`).
    ///
    /// History referencing the product stays intact; the product simply
    /// stops appearing in active listings and new carts.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(product_id = %id, "Soft-deleting product");

        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Counts active products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = test_db().await;
        let repo = db.products();

        let product = repo
            .insert(NewProduct {
                sku: "ATTA-10KG".to_string(),
                name: "Atta 10kg".to_string(),
                unit_cost_cents: Some(90_000),
                selling_price_cents: 120_000,
            })
            .await
            .unwrap();

        let by_id = repo.get_by_id(&product.id).await.unwrap();
        assert_eq!(by_id.sku, "ATTA-10KG");

        let by_sku = repo.get_by_sku("ATTA-10KG").await.unwrap();
        assert_eq!(by_sku.id, product.id);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = test_db().await;
        let repo = db.products();

        let input = NewProduct {
            sku: "GHEE-1KG".to_string(),
            name: "Ghee 1kg".to_string(),
            unit_cost_cents: None,
            selling_price_cents: 60_000,
        };
        repo.insert(input.clone()).await.unwrap();

        let err = repo.insert(input).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_listing() {
        let db = test_db().await;
        let repo = db.products();

        let product = repo
            .insert(NewProduct {
                sku: "CHAI-250G".to_string(),
                name: "Chai 250g".to_string(),
                unit_cost_cents: None,
                selling_price_cents: 35_000,
            })
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        repo.soft_delete(&product.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.list_active(10).await.unwrap().is_empty());

        // Still fetchable by id for history screens
        let found = repo.get_by_id(&product.id).await.unwrap();
        assert!(!found.is_active);
    }

    #[tokio::test]
    async fn test_update_price_leaves_missing_product_not_found() {
        let db = test_db().await;
        let err = db.products().update_price("ghost", 100).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
