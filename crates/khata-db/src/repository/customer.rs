//! # Customer Repository
//!
//! Database operations for customers and their credit lines.
//!
//! `current_balance_cents` is NOT writable here: it moves only inside the
//! checkout, payment, and returns engine transactions. This repository
//! covers master data (name, phone, limit) and reads.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use khata_core::validation::{validate_credit_limit, validate_name};
use khata_core::Customer;

/// Input for creating a customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub phone: Option<String>,
    /// Zero means cash only.
    pub credit_limit_cents: i64,
}

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Inserts a new customer with a zero opening balance.
    pub async fn insert(&self, input: NewCustomer) -> DbResult<Customer> {
        validate_name(&input.name).map_err(khata_core::LedgerError::from)?;
        validate_credit_limit(input.credit_limit_cents)
            .map_err(khata_core::LedgerError::from)?;

        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            phone: input.phone,
            credit_limit_cents: input.credit_limit_cents,
            current_balance_cents: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        debug!(name = %customer.name, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers
                (id, name, phone, credit_limit_cents, current_balance_cents,
                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.credit_limit_cents)
        .bind(customer.current_balance_cents)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer by UUID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Customer> {
        sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    /// Lists all customers sorted by name.
    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let customers =
            sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(customers)
    }

    /// Updates a customer's credit limit.
    ///
    /// Lowering the limit below the current balance is allowed: existing
    /// debt stands, but no new credit fits until it is paid down.
    pub async fn update_credit_limit(&self, id: &str, credit_limit_cents: i64) -> DbResult<()> {
        validate_credit_limit(credit_limit_cents).map_err(khata_core::LedgerError::from)?;

        let result = sqlx::query(
            r#"
            UPDATE customers
            SET credit_limit_cents = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(credit_limit_cents)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }
        Ok(())
    }

    /// Lists customers carrying any unpaid credit, highest balance first.
    pub async fn list_with_balance(&self) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE current_balance_cents > 0
            ORDER BY current_balance_cents DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(customers)
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
    async fn test_insert_starts_with_zero_balance() {
        let db = test_db().await;
        let customer = db
            .customers()
            .insert(NewCustomer {
                name: "Bilal".to_string(),
                phone: Some("0300-1234567".to_string()),
                credit_limit_cents: 50_000,
            })
            .await
            .unwrap();

        assert_eq!(customer.current_balance_cents, 0);
        assert_eq!(customer.available_credit().cents(), 50_000);
    }

    #[tokio::test]
    async fn test_negative_limit_rejected() {
        let db = test_db().await;
        let err = db
            .customers()
            .insert(NewCustomer {
                name: "Bad".to_string(),
                phone: None,
                credit_limit_cents: -1,
            })
            .await
            .unwrap_err();
        assert!(err.is_business_error());
    }

    #[tokio::test]
    async fn test_update_credit_limit() {
        let db = test_db().await;
        let repo = db.customers();
        let customer = repo
            .insert(NewCustomer {
                name: "Sana".to_string(),
                phone: None,
                credit_limit_cents: 10_000,
            })
            .await
            .unwrap();

        repo.update_credit_limit(&customer.id, 25_000).await.unwrap();
        let updated = repo.get_by_id(&customer.id).await.unwrap();
        assert_eq!(updated.credit_limit_cents, 25_000);
    }
}
