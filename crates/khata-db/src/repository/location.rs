//! # Location Repository
//!
//! Database operations for stock locations (warehouses and store fronts).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use khata_core::validation::validate_name;
use khata_core::{Location, LocationType};

/// Input for creating a location.
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub name: String,
    pub location_type: LocationType,
}

/// Repository for location database operations.
#[derive(Debug, Clone)]
pub struct LocationRepository {
    pool: SqlitePool,
}

impl LocationRepository {
    /// Creates a new LocationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LocationRepository { pool }
    }

    /// Inserts a new location.
    pub async fn insert(&self, input: NewLocation) -> DbResult<Location> {
        validate_name(&input.name).map_err(khata_core::LedgerError::from)?;

        let location = Location {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            location_type: input.location_type,
            created_at: Utc::now(),
        };

        debug!(name = %location.name, "Inserting location");

        sqlx::query(
            r#"
            INSERT INTO locations (id, name, location_type, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&location.id)
        .bind(&location.name)
        .bind(location.location_type)
        .bind(location.created_at)
        .execute(&self.pool)
        .await?;

        Ok(location)
    }

    /// Gets a location by its UUID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Location> {
        sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Location", id))
    }

    /// Lists all locations sorted by name.
    pub async fn list(&self) -> DbResult<Vec<Location>> {
        let locations =
            sqlx::query_as::<_, Location>("SELECT * FROM locations ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(locations)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
