//! City-level air-quality aggregation.
//!
//! OpenAQ station names are not consistent within a city, so a city is
//! resolved to a handful of stations, each station's latest readings are
//! fetched independently, and numeric readings are averaged per parameter.
//!
//! Failure isolation:
//! - station lookup transport/status/decode failure → fixed dummy values
//! - station lookup returns nothing → `NotFound`
//! - one station fails → that station is dropped, the rest still count

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::errors::{AppError, FetchError};
use crate::helpers::mean;
use crate::services::openaq::OpenAqClient;

/// Served when the station lookup itself cannot be completed.
const FALLBACK_AGGREGATE: [(&str, f64); 3] = [("pm25", 20.0), ("pm10", 35.0), ("no2", 15.0)];

/// Averaged readings for a city plus the raw station records they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AggregatedAirQuality {
    /// Mean value per parameter across reporting stations
    pub aggregated: BTreeMap<String, f64>,
    /// When this aggregate was computed (RFC 3339, UTC)
    pub last_updated: String,
    /// Raw latest-reading records, in station resolution order
    #[serde(alias = "locations")]
    #[schema(value_type = Vec<Object>)]
    pub stations: Vec<serde_json::Value>,
}

impl AggregatedAirQuality {
    fn fallback(now: DateTime<Utc>) -> Self {
        Self {
            aggregated: FALLBACK_AGGREGATE
                .iter()
                .map(|(param, value)| (param.to_string(), *value))
                .collect(),
            last_updated: format_timestamp(now),
            stations: Vec::new(),
        }
    }
}

/// One raw `/latest` record and the numeric measurements extracted from it.
#[derive(Debug, Clone)]
pub struct StationReading {
    pub station_id: String,
    pub measurements: Vec<(String, f64)>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LatestRecord {
    #[serde(default)]
    measurements: Vec<RawMeasurement>,
}

#[derive(Debug, Deserialize)]
struct RawMeasurement {
    parameter: String,
    #[serde(default)]
    value: serde_json::Value,
}

impl StationReading {
    /// Extract measurements from a raw record. Non-numeric values are dropped;
    /// a record whose `measurements` is not a list of `{parameter, value}` is
    /// a decode failure.
    pub fn from_raw(station_id: &str, raw: serde_json::Value) -> Result<Self, FetchError> {
        let record: LatestRecord = serde_json::from_value(raw.clone())?;
        let measurements = record
            .measurements
            .into_iter()
            .filter_map(|m| match m.value.as_f64().filter(|v| v.is_finite()) {
                Some(value) => Some((m.parameter, value)),
                None => {
                    tracing::debug!(
                        "Skipping non-numeric {} value at station {}: {}",
                        m.parameter,
                        station_id,
                        m.value
                    );
                    None
                }
            })
            .collect();

        Ok(Self {
            station_id: station_id.to_string(),
            measurements,
            raw,
        })
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn cache_key(city: &str) -> String {
    format!("air_quality_{}", city)
}

/// Average readings per parameter. Parameters nobody reported are omitted.
pub fn merge_readings(readings: Vec<StationReading>, now: DateTime<Utc>) -> AggregatedAirQuality {
    let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut stations = Vec::with_capacity(readings.len());

    for reading in readings {
        tracing::debug!(
            "Station {} reported {} numeric readings",
            reading.station_id,
            reading.measurements.len()
        );
        for (param, value) in reading.measurements {
            values.entry(param).or_default().push(value);
        }
        stations.push(reading.raw);
    }

    let aggregated = values
        .into_iter()
        .filter_map(|(param, vals)| mean(&vals).map(|avg| (param, avg)))
        .collect();

    AggregatedAirQuality {
        aggregated,
        last_updated: format_timestamp(now),
        stations,
    }
}

/// Aggregate the latest readings of up to five stations in `city`.
///
/// Station fetches run concurrently and never cancel each other. Duplicate
/// station identifiers from the lookup are fetched and counted once each.
pub async fn aggregate_city(
    client: &OpenAqClient,
    city: &str,
) -> Result<AggregatedAirQuality, AppError> {
    let fetcher = client.fetcher();
    let key = cache_key(city);

    if let Some(cached) = fetcher.cached::<AggregatedAirQuality>(&key).await {
        return Ok(cached);
    }

    let stations = match client.lookup_stations(city).await {
        Ok(stations) => stations,
        Err(e) => {
            tracing::debug!("Station lookup for {} failed, serving dummy values: {}", city, e);
            return Ok(AggregatedAirQuality::fallback(fetcher.cache().now()));
        }
    };

    if stations.is_empty() {
        return Err(AppError::NotFound(format!(
            "No locations found for city '{}'",
            city
        )));
    }

    let station_ids: Vec<&str> = stations
        .iter()
        .filter_map(|station| {
            let id = station.identifier();
            if id.is_none() {
                tracing::debug!("Skipping station without a name in {}", city);
            }
            id
        })
        .collect();

    let fetches = station_ids.iter().map(|id| client.latest_readings(id));
    let results = futures::future::join_all(fetches).await;

    let mut readings = Vec::new();
    for (station_id, result) in station_ids.iter().zip(results) {
        match result {
            Ok(records) => readings.extend(records),
            Err(e) => {
                tracing::debug!(
                    "Dropping location {} from the aggregate: {}",
                    station_id,
                    e
                );
            }
        }
    }

    let result = merge_readings(readings, fetcher.cache().now());
    fetcher.store(&key, &result).await;
    Ok(result)
}
