use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::db::{Granularity, Location, LocationRepository, NewReading, ReadingRepository};
use crate::fetch_error::FetchError;
use crate::fetcher::{TimelineEntry, TomorrowClient};
use crate::metrics::ScopedTimer;

/// Knobs for a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub granularity: Granularity,
    /// Hours of recent history to request, relative to the run start.
    pub historical_hours: i64,
    /// Hours of forecast to request, relative to the run start.
    pub forecast_hours: i64,
    /// Pause between per-location API requests, to stay under the
    /// vendor's rate limit.
    pub request_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            granularity: Granularity::Hourly,
            historical_hours: 24,
            forecast_hours: 120,
            request_delay: Duration::from_secs(3),
        }
    }
}

/// What a pipeline run did. Fetch failures are per-location and do not
/// abort the run; skipped readings are rows the store rejected for an
/// unknown location id.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub locations_processed: usize,
    pub locations_failed: usize,
    pub readings_upserted: usize,
    pub readings_skipped: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineOutcome {
    pub fn success(&self) -> bool {
        self.locations_failed == 0 && self.errors.is_empty()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Map one API timeline entry onto a storable reading, field by field.
/// Every optional value the API omitted stays `None`; fields the API
/// added that the store does not know about never reach this point.
pub fn map_timeline_entry(
    location_id: i32,
    granularity: Granularity,
    entry: &TimelineEntry,
) -> NewReading {
    let v = &entry.values;
    NewReading {
        location_id,
        timestamp: entry.time,
        temperature: v.temperature,
        temperature_apparent: v.temperature_apparent,
        wind_speed: v.wind_speed,
        wind_gust: v.wind_gust,
        wind_direction: v.wind_direction,
        humidity: v.humidity,
        precipitation_probability: v.precipitation_probability,
        weather_code: v.weather_code,
        cloud_cover: v.cloud_cover,
        visibility: v.visibility,
        pressure_sea_level: v.pressure_sea_level,
        pressure_surface_level: v.pressure_surface_level,
        dew_point: v.dew_point,
        uv_index: v.uv_index,
        data_granularity: granularity,
    }
}

/// Run the pipeline end to end: load active locations, fetch timelines
/// for each, map to readings, and land everything in one batch upsert.
///
/// All API fetches complete before the store is touched, so no database
/// connection is ever held across a network call to the vendor. A rate
/// limit stops further fetching but whatever was collected still lands.
#[instrument(skip_all, fields(granularity = %options.granularity))]
pub async fn run_pipeline(
    client: &TomorrowClient,
    location_repo: &LocationRepository,
    reading_repo: &ReadingRepository,
    options: &PipelineOptions,
) -> PipelineOutcome {
    let timer = ScopedTimer::start("etl_pipeline");
    let started_at = Utc::now();

    let mut outcome = PipelineOutcome {
        locations_processed: 0,
        locations_failed: 0,
        readings_upserted: 0,
        readings_skipped: 0,
        errors: Vec::new(),
        started_at,
        completed_at: started_at,
    };

    let locations = match location_repo.active_locations().await {
        Ok(locations) => locations,
        Err(e) => {
            error!("Failed to load active locations: {}", e);
            outcome.errors.push(format!("failed to load locations: {e}"));
            outcome.completed_at = Utc::now();
            timer.finish("error");
            return outcome;
        }
    };

    if locations.is_empty() {
        warn!("No active locations, nothing to fetch");
        outcome.completed_at = Utc::now();
        timer.finish("noop");
        return outcome;
    }

    let start = started_at - chrono::Duration::hours(options.historical_hours);
    let end = started_at + chrono::Duration::hours(options.forecast_hours);

    info!(
        locations = locations.len(),
        start = %start,
        end = %end,
        "Pipeline run started"
    );

    let readings = fetch_all_locations(client, &locations, options, start, end, &mut outcome).await;

    if readings.is_empty() {
        warn!("No readings collected, skipping upsert");
        outcome.completed_at = Utc::now();
        timer.finish(if outcome.success() { "noop" } else { "error" });
        return outcome;
    }

    match reading_repo.upsert_batch(&readings).await {
        Ok(result) => {
            outcome.readings_upserted = result.upserted;
            outcome.readings_skipped = result.skipped.len();
            for key in &result.skipped {
                warn!(
                    location_id = key.location_id,
                    timestamp = %key.timestamp,
                    granularity = %key.data_granularity,
                    "Reading skipped: unknown location"
                );
            }
        }
        Err(e) => {
            error!("Batch upsert failed: {}", e);
            outcome.errors.push(format!("batch upsert failed: {e}"));
        }
    }

    outcome.completed_at = Utc::now();
    info!(
        locations_processed = outcome.locations_processed,
        locations_failed = outcome.locations_failed,
        readings_upserted = outcome.readings_upserted,
        readings_skipped = outcome.readings_skipped,
        duration_ms = outcome.duration().num_milliseconds(),
        "Pipeline run finished"
    );

    timer.finish(if outcome.success() { "success" } else { "partial" });
    outcome
}

async fn fetch_all_locations(
    client: &TomorrowClient,
    locations: &[Location],
    options: &PipelineOptions,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    outcome: &mut PipelineOutcome,
) -> Vec<NewReading> {
    let mut readings = Vec::new();

    for (i, location) in locations.iter().enumerate() {
        if i > 0 {
            sleep(options.request_delay).await;
        }

        match client
            .fetch_timelines(location, options.granularity, start, end)
            .await
        {
            Ok(response) => {
                let entries = response.entries(options.granularity);
                debug!(
                    location_id = location.id,
                    entries = entries.len(),
                    "Mapped timeline entries"
                );
                readings.extend(
                    entries
                        .iter()
                        .map(|entry| map_timeline_entry(location.id, options.granularity, entry)),
                );
                outcome.locations_processed += 1;
            }
            Err(FetchError::RateLimited) => {
                outcome.locations_failed += 1;
                outcome.errors.push(format!(
                    "rate limit hit at location {}, stopping to preserve quota",
                    location.id
                ));
                warn!(
                    location_id = location.id,
                    "Rate limit hit, stopping fetch loop"
                );
                break;
            }
            Err(e) => {
                outcome.locations_failed += 1;
                outcome
                    .errors
                    .push(format!("API error for location {}: {e}", location.id));
                error!(location_id = location.id, "API error: {}", e);
            }
        }
    }

    readings
}
