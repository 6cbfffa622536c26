use std::collections::{HashMap, HashSet};

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use crate::db::{
    DbError, Granularity, LocationSummary, NewReading, Reading, ReadingKey, UpsertOutcome,
};

const READING_COLUMNS: &str = "location_id, \"timestamp\", temperature, temperature_apparent, \
     wind_speed, wind_gust, wind_direction, humidity, \
     precipitation_probability, weather_code, cloud_cover, visibility, \
     pressure_sea_level, pressure_surface_level, dew_point, uv_index, \
     data_granularity, fetched_at";

/// Ingestion store for weather readings.
///
/// Exclusively owns writes to `weather_data`. Every write is keyed by
/// business identity (location, timestamp, granularity), which is what
/// makes re-running ingestion idempotent: a scheduler double-fire or a
/// manual replay converges on the same final state as a single run.
#[derive(Clone)]
pub struct ReadingRepository {
    pool: PgPool,
}

impl ReadingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert-or-replace a batch of readings in one set-based statement.
    ///
    /// On key conflict all value columns are overwritten and `fetched_at`
    /// is refreshed by the database. Rows referencing a location id that
    /// does not exist are filtered out before the insert and reported in
    /// [`UpsertOutcome::skipped`]; the rest of the batch still lands.
    ///
    /// If the same key appears more than once in `readings`, the last
    /// occurrence wins (Postgres rejects a statement that touches the
    /// same conflict target twice, so duplicates are collapsed here).
    #[instrument(skip(self, readings), fields(count = readings.len()))]
    pub async fn upsert_batch(&self, readings: &[NewReading]) -> Result<UpsertOutcome, DbError> {
        if readings.is_empty() {
            debug!("Empty batch, nothing to upsert");
            return Ok(UpsertOutcome::default());
        }

        let mut deduped: HashMap<ReadingKey, &NewReading> = HashMap::new();
        for reading in readings {
            deduped.insert(reading.key(), reading);
        }

        let n = deduped.len();
        let mut location_ids = Vec::with_capacity(n);
        let mut timestamps = Vec::with_capacity(n);
        let mut temperatures = Vec::with_capacity(n);
        let mut temperatures_apparent = Vec::with_capacity(n);
        let mut wind_speeds = Vec::with_capacity(n);
        let mut wind_gusts = Vec::with_capacity(n);
        let mut wind_directions = Vec::with_capacity(n);
        let mut humidities = Vec::with_capacity(n);
        let mut precipitation_probabilities = Vec::with_capacity(n);
        let mut weather_codes = Vec::with_capacity(n);
        let mut cloud_covers = Vec::with_capacity(n);
        let mut visibilities = Vec::with_capacity(n);
        let mut pressures_sea_level = Vec::with_capacity(n);
        let mut pressures_surface_level = Vec::with_capacity(n);
        let mut dew_points = Vec::with_capacity(n);
        let mut uv_indexes = Vec::with_capacity(n);
        let mut granularities = Vec::with_capacity(n);

        for reading in deduped.values() {
            location_ids.push(reading.location_id);
            // Bind at microsecond precision so the stored timestamp is
            // identical to the one in the row's ReadingKey.
            timestamps.push(reading.timestamp.trunc_subsecs(6));
            temperatures.push(reading.temperature);
            temperatures_apparent.push(reading.temperature_apparent);
            wind_speeds.push(reading.wind_speed);
            wind_gusts.push(reading.wind_gust);
            wind_directions.push(reading.wind_direction);
            humidities.push(reading.humidity);
            precipitation_probabilities.push(reading.precipitation_probability);
            weather_codes.push(reading.weather_code);
            cloud_covers.push(reading.cloud_cover);
            visibilities.push(reading.visibility);
            pressures_sea_level.push(reading.pressure_sea_level);
            pressures_surface_level.push(reading.pressure_surface_level);
            dew_points.push(reading.dew_point);
            uv_indexes.push(reading.uv_index);
            granularities.push(reading.data_granularity.as_str().to_string());
        }

        let applied = sqlx::query_as::<_, ReadingKey>(
            r#"
            INSERT INTO weather_data (
                location_id, "timestamp", temperature, temperature_apparent,
                wind_speed, wind_gust, wind_direction, humidity,
                precipitation_probability, weather_code, cloud_cover, visibility,
                pressure_sea_level, pressure_surface_level, dew_point, uv_index,
                data_granularity
            )
            SELECT r.* FROM UNNEST(
                $1::int4[], $2::timestamptz[], $3::float8[], $4::float8[],
                $5::float8[], $6::float8[], $7::int4[], $8::float8[],
                $9::float8[], $10::int4[], $11::float8[], $12::float8[],
                $13::float8[], $14::float8[], $15::float8[], $16::int4[],
                $17::text[]
            ) AS r(
                location_id, "timestamp", temperature, temperature_apparent,
                wind_speed, wind_gust, wind_direction, humidity,
                precipitation_probability, weather_code, cloud_cover, visibility,
                pressure_sea_level, pressure_surface_level, dew_point, uv_index,
                data_granularity
            )
            WHERE r.location_id IN (SELECT id FROM locations)
            ON CONFLICT (location_id, "timestamp", data_granularity) DO UPDATE SET
                temperature = EXCLUDED.temperature,
                temperature_apparent = EXCLUDED.temperature_apparent,
                wind_speed = EXCLUDED.wind_speed,
                wind_gust = EXCLUDED.wind_gust,
                wind_direction = EXCLUDED.wind_direction,
                humidity = EXCLUDED.humidity,
                precipitation_probability = EXCLUDED.precipitation_probability,
                weather_code = EXCLUDED.weather_code,
                cloud_cover = EXCLUDED.cloud_cover,
                visibility = EXCLUDED.visibility,
                pressure_sea_level = EXCLUDED.pressure_sea_level,
                pressure_surface_level = EXCLUDED.pressure_surface_level,
                dew_point = EXCLUDED.dew_point,
                uv_index = EXCLUDED.uv_index,
                fetched_at = NOW()
            RETURNING location_id, "timestamp", data_granularity
            "#,
        )
        .bind(&location_ids)
        .bind(&timestamps)
        .bind(&temperatures)
        .bind(&temperatures_apparent)
        .bind(&wind_speeds)
        .bind(&wind_gusts)
        .bind(&wind_directions)
        .bind(&humidities)
        .bind(&precipitation_probabilities)
        .bind(&weather_codes)
        .bind(&cloud_covers)
        .bind(&visibilities)
        .bind(&pressures_sea_level)
        .bind(&pressures_surface_level)
        .bind(&dew_points)
        .bind(&uv_indexes)
        .bind(&granularities)
        .fetch_all(&self.pool)
        .await?;

        let applied_keys: HashSet<ReadingKey> = applied.into_iter().collect();
        let skipped: Vec<ReadingKey> = deduped
            .keys()
            .filter(|key| !applied_keys.contains(key))
            .cloned()
            .collect();

        debug!(
            upserted = applied_keys.len(),
            skipped = skipped.len(),
            "Batch upsert complete"
        );

        Ok(UpsertOutcome {
            upserted: applied_keys.len(),
            skipped,
        })
    }

    /// The most recent reading for a location across all granularities.
    ///
    /// When two granularities share the maximum timestamp the finest one
    /// wins (minutely over hourly over daily), so the result is
    /// deterministic. Returns `None` for a location with no readings.
    #[instrument(skip(self))]
    pub async fn latest_reading(&self, location_id: i32) -> Result<Option<Reading>, DbError> {
        let reading = sqlx::query_as::<_, Reading>(&format!(
            r#"
            SELECT {READING_COLUMNS}
            FROM weather_data
            WHERE location_id = $1
            ORDER BY "timestamp" DESC,
                     CASE data_granularity
                         WHEN 'minutely' THEN 0
                         WHEN 'hourly' THEN 1
                         ELSE 2
                     END
            LIMIT 1
            "#
        ))
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reading)
    }

    /// All readings for a location and granularity with a timestamp in
    /// `[start, end]` (both bounds inclusive), ascending. An empty range
    /// yields an empty vec.
    #[instrument(skip(self))]
    pub async fn time_series(
        &self,
        location_id: i32,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>, DbError> {
        let readings = sqlx::query_as::<_, Reading>(&format!(
            r#"
            SELECT {READING_COLUMNS}
            FROM weather_data
            WHERE location_id = $1
              AND data_granularity = $2
              AND "timestamp" BETWEEN $3 AND $4
            ORDER BY "timestamp" ASC
            "#
        ))
        .bind(location_id)
        .bind(granularity)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} readings", readings.len());
        Ok(readings)
    }

    /// Latest reading per active location at the given granularity.
    #[instrument(skip(self))]
    pub async fn latest_by_location(
        &self,
        granularity: Granularity,
    ) -> Result<Vec<LocationSummary>, DbError> {
        let summaries = sqlx::query_as::<_, LocationSummary>(
            r#"
            SELECT DISTINCT ON (l.id)
                l.id AS location_id, l.lat, l.lon, l.name,
                w."timestamp", w.temperature, w.wind_speed, w.humidity
            FROM locations l
            JOIN weather_data w ON w.location_id = l.id
            WHERE w.data_granularity = $1
              AND l.is_active = TRUE
            ORDER BY l.id, w."timestamp" DESC
            "#,
        )
        .bind(granularity)
        .fetch_all(&self.pool)
        .await?;

        Ok(summaries)
    }

    /// Earliest and latest timestamps with data for a location, or `None`
    /// when the location has no readings at that granularity.
    #[instrument(skip(self))]
    pub async fn data_availability(
        &self,
        location_id: i32,
        granularity: Granularity,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, DbError> {
        let row: (Option<DateTime<Utc>>, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT MIN("timestamp"), MAX("timestamp")
            FROM weather_data
            WHERE location_id = $1
              AND data_granularity = $2
            "#,
        )
        .bind(location_id)
        .bind(granularity)
        .fetch_one(&self.pool)
        .await?;

        Ok(match row {
            (Some(earliest), Some(latest)) => Some((earliest, latest)),
            _ => None,
        })
    }
}
