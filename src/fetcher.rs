use std::collections::HashMap;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::db::{Granularity, Location};
use crate::fetch_error::FetchError;

/// The value fields requested from the API: exactly the set the store
/// persists. Fields the API adds later are never requested; fields it
/// omits from a response deserialize to `None`.
const TIMELINE_FIELDS: [&str; 14] = [
    "temperature",
    "temperatureApparent",
    "windSpeed",
    "windGust",
    "windDirection",
    "humidity",
    "precipitationProbability",
    "weatherCode",
    "cloudCover",
    "visibility",
    "pressureSeaLevel",
    "pressureSurfaceLevel",
    "dewPoint",
    "uvIndex",
];

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Weather values for one timeline entry. All fields are optional since
/// the API may omit any of them; unknown fields in the response are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineValues {
    pub temperature: Option<f64>,
    pub temperature_apparent: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_direction: Option<i32>,
    pub humidity: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub weather_code: Option<i32>,
    pub cloud_cover: Option<f64>,
    pub visibility: Option<f64>,
    pub pressure_sea_level: Option<f64>,
    pub pressure_surface_level: Option<f64>,
    pub dew_point: Option<f64>,
    pub uv_index: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineEntry {
    pub time: DateTime<Utc>,
    pub values: TimelineValues,
}

/// Root response of the timelines endpoint, keyed by granularity name
/// ("minutely", "hourly", "daily"). Keys the store does not know about
/// are carried but ignored by consumers.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelinesResponse {
    pub timelines: HashMap<String, Vec<TimelineEntry>>,
}

impl TimelinesResponse {
    pub fn entries(&self, granularity: Granularity) -> &[TimelineEntry] {
        self.timelines
            .get(granularity.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// HTTP client for the Tomorrow.io timelines API.
///
/// Retries rate limits and server errors with exponential backoff;
/// authentication failures are surfaced immediately.
#[derive(Clone)]
pub struct TomorrowClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: usize,
}

impl TomorrowClient {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries,
        })
    }

    /// Fetch forecast timelines for one location over `[start, end]`.
    #[instrument(skip(self, location, start, end), fields(location_id = location.id))]
    pub async fn fetch_timelines(
        &self,
        location: &Location,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimelinesResponse, FetchError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(INITIAL_RETRY_DELAY)
            .with_max_times(self.max_retries);

        (|| self.request_timelines(location, granularity, start, end))
            .retry(backoff)
            .when(|e: &FetchError| e.is_retryable())
            .notify(|err, delay| {
                warn!("Retrying API request in {:?} after error: {}", delay, err);
            })
            .await
    }

    async fn request_timelines(
        &self,
        location: &Location,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimelinesResponse, FetchError> {
        let url = format!("{}/timelines", self.base_url);

        debug!("Sending timelines request to {}", url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("location", format!("{},{}", location.lat, location.lon)),
                ("fields", TIMELINE_FIELDS.join(",")),
                ("timesteps", granularity.timestep().to_string()),
                ("units", "metric".to_string()),
                ("startTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("endTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        debug!("Received response with status {}", status);

        match status.as_u16() {
            401 | 403 => return Err(FetchError::AuthFailed),
            429 => return Err(FetchError::RateLimited),
            s if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Api { status: s, body });
            }
            _ => {}
        }

        let timelines = response.json::<TimelinesResponse>().await?;

        let total_entries: usize = timelines.timelines.values().map(Vec::len).sum();
        debug!(
            location_id = location.id,
            entries = total_entries,
            "Fetched timelines"
        );

        Ok(timelines)
    }
}
