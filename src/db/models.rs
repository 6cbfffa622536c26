use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, FromRow, Postgres, Type};

/// Observation frequency for a reading. Stored as TEXT in Postgres,
/// constrained by a CHECK on `weather_data.data_granularity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minutely,
    Hourly,
    Daily,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Minutely => "minutely",
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }

    /// Timestep parameter the Tomorrow.io timelines API expects.
    pub fn timestep(&self) -> &'static str {
        match self {
            Granularity::Minutely => "1m",
            Granularity::Hourly => "1h",
            Granularity::Daily => "1d",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown granularity: {0}")]
pub struct ParseGranularityError(String);

impl FromStr for Granularity {
    type Err = ParseGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minutely" => Ok(Granularity::Minutely),
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            other => Err(ParseGranularityError(other.to_string())),
        }
    }
}

impl Type<Postgres> for Granularity {
    fn type_info() -> PgTypeInfo {
        <&str as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <&str as Type<Postgres>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Postgres> for Granularity {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <&str as Encode<Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> Decode<'r, Postgres> for Granularity {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as Decode<Postgres>>::decode(value)?;
        Ok(s.parse()?)
    }
}

// Database entity models

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Location {
    pub id: i32,
    pub lat: f64,
    pub lon: f64,
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One persisted weather observation row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Reading {
    pub location_id: i32,
    pub timestamp: DateTime<Utc>,
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
    pub data_granularity: Granularity,
    pub fetched_at: DateTime<Utc>,
}

/// A reading staged for ingestion. `fetched_at` is assigned by the
/// database at write time, so it has no field here.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub location_id: i32,
    pub timestamp: DateTime<Utc>,
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
    pub data_granularity: Granularity,
}

impl NewReading {
    /// A reading with every value field empty. Starting point when only a
    /// few fields matter.
    pub fn empty(
        location_id: i32,
        timestamp: DateTime<Utc>,
        data_granularity: Granularity,
    ) -> Self {
        Self {
            location_id,
            timestamp,
            temperature: None,
            temperature_apparent: None,
            wind_speed: None,
            wind_gust: None,
            wind_direction: None,
            humidity: None,
            precipitation_probability: None,
            weather_code: None,
            cloud_cover: None,
            visibility: None,
            pressure_sea_level: None,
            pressure_surface_level: None,
            dew_point: None,
            uv_index: None,
            data_granularity,
        }
    }

    /// The timestamp is truncated to microseconds, the resolution
    /// Postgres stores, so a key computed here always equals the key of
    /// the persisted row.
    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            location_id: self.location_id,
            timestamp: self.timestamp.trunc_subsecs(6),
            data_granularity: self.data_granularity,
        }
    }
}

/// Business identity of a reading: the composite primary key of
/// `weather_data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow, Serialize)]
pub struct ReadingKey {
    pub location_id: i32,
    pub timestamp: DateTime<Utc>,
    pub data_granularity: Granularity,
}

/// Result of a batch upsert: how many rows landed, and the keys of rows
/// skipped because they referenced an unknown location.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    pub upserted: usize,
    pub skipped: Vec<ReadingKey>,
}

/// Latest reading per location, joined with location metadata.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LocationSummary {
    pub location_id: i32,
    pub lat: f64,
    pub lon: f64,
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub humidity: Option<f64>,
}
