//! OpenAQ v3 client.
//!
//! Countries, cities, per-station latest readings and measurement time
//! series. Only the fields this service consumes are modelled; anything else
//! in a record is carried through untouched as raw JSON.
//! See: https://docs.openaq.org/

use chrono::{Duration as ChronoDuration, SecondsFormat};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use utoipa::ToSchema;

use crate::errors::{AppError, FetchError};
use crate::helpers::build_url;
use crate::services::aggregator::StationReading;
use crate::services::fetcher::{FetchRequest, ResilientFetcher};

const OPENAQ_TIMEOUT: Duration = Duration::from_secs(10);
const API_KEY_HEADER: &str = "x-api-key";

/// Maximum number of stations resolved for one city.
pub const MAX_STATIONS_PER_CITY: u32 = 5;
const CITY_SCAN_LIMIT: u32 = 1000;
const LATEST_READINGS_LIMIT: u32 = 200;

/// Cities served when OpenAQ reports none for a country.
const SAMPLE_CITIES: [&str; 3] = ["Tashkent", "New York", "Delhi"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code
    pub code: String,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountryList {
    pub countries: Vec<Country>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct City {
    pub city: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CityList {
    pub cities: Vec<City>,
}

/// Raw measurement records for one station and parameter, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimeSeries {
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<serde_json::Value>,
}

/// A station as returned by the locations lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct StationDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl StationDescriptor {
    /// Identifier accepted by the latest-readings call: `name`, else `location`.
    pub fn identifier(&self) -> Option<&str> {
        [self.name.as_deref(), self.location.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
    }
}

// --- OpenAQ JSON response types ---

#[derive(Debug, Deserialize)]
struct CountriesResponse {
    results: Vec<Country>,
}

#[derive(Debug, Deserialize)]
struct CountryLocationsResponse {
    results: Vec<CountryLocation>,
}

#[derive(Debug, Deserialize)]
struct CountryLocation {
    #[serde(default)]
    boundary: Option<Boundary>,
}

#[derive(Debug, Deserialize)]
struct Boundary {
    #[serde(default)]
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StationLookupResponse {
    results: Vec<StationDescriptor>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    results: Vec<serde_json::Value>,
}

/// Client for the OpenAQ v3 API.
#[derive(Debug, Clone)]
pub struct OpenAqClient {
    fetcher: ResilientFetcher,
    base_url: Url,
    headers: HeaderMap,
}

impl OpenAqClient {
    pub fn new(
        fetcher: ResilientFetcher,
        base_url: &str,
        api_key: Option<&str>,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            AppError::InternalError(format!("Invalid OpenAQ base URL '{}': {}", base_url, e))
        })?;

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| AppError::InternalError(format!("Invalid OpenAQ API key: {}", e)))?;
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        Ok(Self {
            fetcher,
            base_url,
            headers,
        })
    }

    pub fn fetcher(&self) -> &ResilientFetcher {
        &self.fetcher
    }

    fn request(&self, path: &str, params: &[(&str, String)]) -> FetchRequest {
        FetchRequest::new(build_url(&self.base_url, path, params))
            .headers(&self.headers)
            .timeout(OPENAQ_TIMEOUT)
    }

    /// All countries with air-quality data.
    pub async fn countries(&self) -> CountryList {
        let req = self.request("countries", &[]).cache_key("countries");
        let fallback = CountriesResponse {
            results: vec![
                Country {
                    code: "UZ".to_string(),
                    name: "Uzbekistan".to_string(),
                },
                Country {
                    code: "US".to_string(),
                    name: "United States".to_string(),
                },
            ],
        };

        let data = self.fetcher.fetch_with_fallback(&req, fallback).await;
        CountryList {
            countries: data.results,
        }
    }

    /// Distinct city names reported for a country, sorted ascending.
    pub async fn cities(&self, country: &str) -> CityList {
        let req = self
            .request(
                "locations",
                &[
                    ("country", country.to_string()),
                    ("limit", CITY_SCAN_LIMIT.to_string()),
                ],
            )
            .cache_key(format!("cities_{}", country));
        let data = self
            .fetcher
            .fetch_with_fallback(&req, CountryLocationsResponse { results: vec![] })
            .await;

        let names: BTreeSet<String> = data
            .results
            .into_iter()
            .filter_map(|loc| loc.boundary.and_then(|b| b.city))
            .map(|city| city.trim().to_string())
            .filter(|city| !city.is_empty())
            .collect();

        if names.is_empty() {
            tracing::debug!("No cities found for country '{}', serving sample list", country);
            return CityList {
                cities: SAMPLE_CITIES
                    .iter()
                    .map(|c| City { city: c.to_string() })
                    .collect(),
            };
        }

        CityList {
            cities: names.into_iter().map(|city| City { city }).collect(),
        }
    }

    /// Most recent `limit` measurements of `parameter` at a station.
    pub async fn time_series(&self, location: &str, parameter: &str, limit: u32) -> TimeSeries {
        let req = self
            .request(
                "measurements",
                &[
                    ("location", location.to_string()),
                    ("parameter", parameter.to_string()),
                    ("limit", limit.to_string()),
                    ("sort", "desc".to_string()),
                ],
            )
            .cache_key(format!("measurements_{}_{}_{}", location, parameter, limit));

        let now = self.fetcher.cache().now();
        let fallback = TimeSeries {
            results: (0..limit)
                .map(|i| {
                    let at = now - ChronoDuration::hours(i64::from(i));
                    serde_json::json!({
                        "date": { "utc": at.to_rfc3339_opts(SecondsFormat::Secs, true) },
                        "value": 10 + i % 5,
                    })
                })
                .collect(),
        };

        self.fetcher.fetch_with_fallback(&req, fallback).await
    }

    /// Resolve up to [`MAX_STATIONS_PER_CITY`] stations for a city. Uncached.
    pub async fn lookup_stations(&self, city: &str) -> Result<Vec<StationDescriptor>, FetchError> {
        let req = self.request(
            "locations",
            &[
                ("city", city.to_string()),
                ("limit", MAX_STATIONS_PER_CITY.to_string()),
            ],
        );
        let response: StationLookupResponse = self.fetcher.request(&req).await?;
        // `limit` is only a hint to OpenAQ
        Ok(response
            .results
            .into_iter()
            .take(MAX_STATIONS_PER_CITY as usize)
            .collect())
    }

    /// Latest reading records for one station. Uncached.
    pub async fn latest_readings(&self, station_id: &str) -> Result<Vec<StationReading>, FetchError> {
        let req = self.request(
            "latest",
            &[
                ("location", station_id.to_string()),
                ("limit", LATEST_READINGS_LIMIT.to_string()),
            ],
        );
        let response: LatestResponse = self.fetcher.request(&req).await?;
        response
            .results
            .into_iter()
            .map(|raw| StationReading::from_raw(station_id, raw))
            .collect()
    }
}
