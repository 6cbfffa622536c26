use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::{DbError, Location};

/// Registry of the geolocations the pipeline fetches forecasts for.
///
/// Locations are seeded by migration and soft-deleted via `is_active`;
/// a hard [`delete`](Self::delete) cascades to the location's readings.
#[derive(Clone)]
pub struct LocationRepository {
    pool: PgPool,
}

impl LocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All locations eligible for scheduled ingestion, ordered by id.
    #[instrument(skip(self))]
    pub async fn active_locations(&self) -> Result<Vec<Location>, DbError> {
        let locations = sqlx::query_as::<_, Location>(
            "SELECT id, lat, lon, name, is_active, created_at
             FROM locations
             WHERE is_active = TRUE
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} active locations", locations.len());
        Ok(locations)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i32) -> Result<Option<Location>, DbError> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT id, lat, lon, name, is_active, created_at
             FROM locations
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(location)
    }

    #[instrument(skip(self))]
    pub async fn find_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Option<Location>, DbError> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT id, lat, lon, name, is_active, created_at
             FROM locations
             WHERE lat = $1 AND lon = $2",
        )
        .bind(lat)
        .bind(lon)
        .fetch_optional(&self.pool)
        .await?;

        Ok(location)
    }

    /// Insert a new location. A duplicate coordinate pair or an
    /// out-of-range lat/lon surfaces as [`DbError::ConstraintViolation`].
    #[instrument(skip(self))]
    pub async fn insert(
        &self,
        lat: f64,
        lon: f64,
        name: Option<&str>,
    ) -> Result<Location, DbError> {
        let location = sqlx::query_as::<_, Location>(
            "INSERT INTO locations (lat, lon, name)
             VALUES ($1, $2, $3)
             RETURNING id, lat, lon, name, is_active, created_at",
        )
        .bind(lat)
        .bind(lon)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        debug!(location_id = location.id, "Inserted location");
        Ok(location)
    }

    /// Soft delete (or reactivate) a location. Returns false when the id
    /// does not exist.
    #[instrument(skip(self))]
    pub async fn set_active(&self, id: i32, is_active: bool) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE locations SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Hard delete. Readings referencing the location are removed by the
    /// ON DELETE CASCADE on `weather_data`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
