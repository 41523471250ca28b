//! Open-Meteo forecast API client.
//!
//! Current conditions and daily forecasts. Both responses carry a `source`
//! tag so callers can tell live data from fallback data.
//! See: https://open-meteo.com/en/docs

use chrono::NaiveDate;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::build_url;
use crate::services::fetcher::{FetchRequest, ResilientFetcher};
use crate::services::synth::{synthesize, RandomSource, ThreadRandom, DEFAULT_BASE_TEMPERATURE};

const CURRENT_WEATHER_TIMEOUT: Duration = Duration::from_secs(8);
const FORECAST_TIMEOUT: Duration = Duration::from_secs(10);
/// Shorter budget for the temperature lookup that seeds a fallback forecast.
const FALLBACK_SEED_TIMEOUT: Duration = Duration::from_secs(6);

const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum";

/// Where a weather payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    OpenMeteo,
    Fallback,
}

/// Current conditions as reported by Open-Meteo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CurrentWeather {
    /// Air temperature at 2 m
    pub temperature: f64,
    /// Wind speed at 10 m
    pub windspeed: f64,
    /// Wind direction in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winddirection: Option<f64>,
    /// WMO weather interpretation code
    pub weathercode: i32,
    /// Observation time (local ISO 8601)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentWeatherResponse {
    pub source: DataSource,
    /// Null when the upstream was unavailable
    pub current_weather: Option<CurrentWeather>,
}

/// Daily forecast arrays, index-aligned to `time`.
///
/// Uses Open-Meteo's daily field names. Individual values may be null when
/// the upstream has no data for that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastSeries {
    pub time: Vec<NaiveDate>,
    pub temperature_2m_max: Vec<Option<f64>>,
    pub temperature_2m_min: Vec<Option<f64>>,
    pub precipitation_sum: Vec<Option<f64>>,
}

impl ForecastSeries {
    pub fn with_capacity(days: usize) -> Self {
        Self {
            time: Vec::with_capacity(days),
            temperature_2m_max: Vec::with_capacity(days),
            temperature_2m_min: Vec::with_capacity(days),
            precipitation_sum: Vec::with_capacity(days),
        }
    }

    pub fn push(
        &mut self,
        date: NaiveDate,
        max_temp: Option<f64>,
        min_temp: Option<f64>,
        precipitation: Option<f64>,
    ) {
        self.time.push(date);
        self.temperature_2m_max.push(max_temp);
        self.temperature_2m_min.push(min_temp);
        self.precipitation_sum.push(precipitation);
    }

    pub fn is_aligned(&self) -> bool {
        let n = self.time.len();
        self.temperature_2m_max.len() == n
            && self.temperature_2m_min.len() == n
            && self.precipitation_sum.len() == n
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastResponse {
    pub source: DataSource,
    pub daily: ForecastSeries,
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherEnvelope {
    current_weather: CurrentWeather,
}

/// Upstream forecast body. Rejects series whose arrays differ in length.
#[derive(Debug, Deserialize)]
#[serde(try_from = "RawForecastEnvelope")]
struct ForecastEnvelope {
    daily: ForecastSeries,
}

#[derive(Deserialize)]
struct RawForecastEnvelope {
    daily: ForecastSeries,
}

impl TryFrom<RawForecastEnvelope> for ForecastEnvelope {
    type Error = String;

    fn try_from(raw: RawForecastEnvelope) -> Result<Self, Self::Error> {
        let series = raw.daily;
        if !series.is_aligned() {
            return Err(format!(
                "daily arrays differ in length (time={}, max={}, min={}, precipitation={})",
                series.time.len(),
                series.temperature_2m_max.len(),
                series.temperature_2m_min.len(),
                series.precipitation_sum.len()
            ));
        }
        Ok(ForecastEnvelope { daily: series })
    }
}

#[derive(Clone)]
pub struct OpenMeteoClient {
    fetcher: ResilientFetcher,
    base_url: Url,
    rng: Arc<dyn RandomSource>,
}

impl OpenMeteoClient {
    pub fn new(fetcher: ResilientFetcher, base_url: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            AppError::InternalError(format!("Invalid Open-Meteo base URL '{}': {}", base_url, e))
        })?;
        Ok(Self {
            fetcher,
            base_url,
            rng: Arc::new(ThreadRandom),
        })
    }

    /// Replace the noise source used for fallback forecasts.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn with_random(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    fn current_weather_request(&self, lat: f64, lon: f64, timeout: Duration) -> FetchRequest {
        let url = build_url(
            &self.base_url,
            "",
            &[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current_weather", "true".to_string()),
                ("timezone", "auto".to_string()),
            ],
        );
        FetchRequest::new(url).timeout(timeout)
    }

    /// Current temperature, wind and weather code for a coordinate.
    pub async fn current_weather(&self, lat: f64, lon: f64) -> CurrentWeatherResponse {
        let req = self.current_weather_request(lat, lon, CURRENT_WEATHER_TIMEOUT);
        match self.fetcher.fetch::<CurrentWeatherEnvelope>(&req).await.into_result() {
            Ok(envelope) => CurrentWeatherResponse {
                source: DataSource::OpenMeteo,
                current_weather: Some(envelope.current_weather),
            },
            Err(e) => {
                tracing::debug!("Open-Meteo current weather failed for {},{}: {}", lat, lon, e);
                CurrentWeatherResponse {
                    source: DataSource::Fallback,
                    current_weather: None,
                }
            }
        }
    }

    /// Daily forecast for `days` days (1-16), synthesized when Open-Meteo is unreachable.
    pub async fn forecast(&self, lat: f64, lon: f64, days: u8) -> ForecastResponse {
        let url = build_url(
            &self.base_url,
            "",
            &[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", days.to_string()),
            ],
        );
        let req = FetchRequest::new(url).timeout(FORECAST_TIMEOUT);

        match self.fetcher.fetch::<ForecastEnvelope>(&req).await.into_result() {
            Ok(envelope) => ForecastResponse {
                source: DataSource::OpenMeteo,
                daily: envelope.daily,
            },
            Err(e) => {
                tracing::debug!("Open-Meteo forecast failed, synthesizing for {},{}: {}", lat, lon, e);
                ForecastResponse {
                    source: DataSource::Fallback,
                    daily: self.synthesize_forecast(lat, lon, days).await,
                }
            }
        }
    }

    /// Build a fallback series seeded from the current temperature, if reachable.
    async fn synthesize_forecast(&self, lat: f64, lon: f64, days: u8) -> ForecastSeries {
        let req = self.current_weather_request(lat, lon, FALLBACK_SEED_TIMEOUT);
        let base_temperature = match self.fetcher.fetch::<CurrentWeatherEnvelope>(&req).await.into_result() {
            Ok(envelope) => envelope.current_weather.temperature,
            Err(_) => DEFAULT_BASE_TEMPERATURE,
        };
        let today = self.fetcher.cache().now().date_naive();
        synthesize(today, days as usize, base_temperature, self.rng.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, ManualClock};
    use crate::services::synth::tests::ScriptedRandom;
    use serde_json::json;
    use wiremock::matchers::{method, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenMeteoClient {
        let clock = ManualClock::new("2026-03-01T08:00:00Z".parse().unwrap());
        let fetcher = ResilientFetcher::new(CacheStore::new(clock));
        OpenMeteoClient::new(fetcher, &server.uri())
            .unwrap()
            // Zero jitter: max = base + 5, min = base - 2, precipitation = 0
            .with_random(Arc::new(ScriptedRandom::new(vec![0.0])))
    }

    fn current_body(temperature: f64) -> serde_json::Value {
        json!({
            "latitude": 41.3,
            "longitude": 69.3,
            "current_weather": {
                "time": "2026-03-01T13:00",
                "temperature": temperature,
                "windspeed": 7.2,
                "winddirection": 250.0,
                "weathercode": 3
            }
        })
    }

    async fn mount_forecast(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(query_param("daily", DAILY_FIELDS))
            .respond_with(template)
            .mount(server)
            .await;
    }

    async fn mount_current(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(query_param("current_weather", "true"))
            .and(query_param_is_missing("daily"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[test]
    fn test_data_source_serialization() {
        assert_eq!(serde_json::to_value(DataSource::OpenMeteo).unwrap(), json!("open-meteo"));
        assert_eq!(serde_json::to_value(DataSource::Fallback).unwrap(), json!("fallback"));
    }

    #[test]
    fn test_misaligned_series_rejected() {
        let raw = json!({
            "daily": {
                "time": ["2026-03-01", "2026-03-02"],
                "temperature_2m_max": [1.0, 2.0],
                "temperature_2m_min": [0.0],
                "precipitation_sum": [0.0, 0.1]
            }
        });
        let err = serde_json::from_value::<ForecastEnvelope>(raw).unwrap_err();
        assert!(err.to_string().contains("differ in length"));
    }

    #[test]
    fn test_series_accepts_null_values() {
        let raw = json!({
            "time": ["2026-03-01"],
            "temperature_2m_max": [null],
            "temperature_2m_min": [-1.5],
            "precipitation_sum": [0.0]
        });
        let series: ForecastSeries = serde_json::from_value(raw).unwrap();
        assert_eq!(series.temperature_2m_max, vec![None]);
        assert_eq!(series.temperature_2m_min, vec![Some(-1.5)]);
    }

    #[tokio::test]
    async fn test_current_weather_live() {
        let server = MockServer::start().await;
        mount_current(&server, ResponseTemplate::new(200).set_body_json(current_body(13.4))).await;

        let response = client(&server).current_weather(41.3, 69.3).await;
        assert_eq!(response.source, DataSource::OpenMeteo);
        let current = response.current_weather.unwrap();
        assert_eq!(current.temperature, 13.4);
        assert_eq!(current.weathercode, 3);
    }

    #[tokio::test]
    async fn test_current_weather_fallback_on_failure() {
        let server = MockServer::start().await;
        mount_current(&server, ResponseTemplate::new(502)).await;

        let response = client(&server).current_weather(41.3, 69.3).await;
        assert_eq!(response.source, DataSource::Fallback);
        assert!(response.current_weather.is_none());
    }

    #[tokio::test]
    async fn test_forecast_live() {
        let server = MockServer::start().await;
        mount_forecast(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({
                "daily": {
                    "time": ["2026-03-01", "2026-03-02"],
                    "temperature_2m_max": [12.1, 13.4],
                    "temperature_2m_min": [2.0, 3.3],
                    "precipitation_sum": [0.0, 1.2]
                }
            })),
        )
        .await;

        let response = client(&server).forecast(41.3, 69.3, 2).await;
        assert_eq!(response.source, DataSource::OpenMeteo);
        assert_eq!(response.daily.temperature_2m_max, vec![Some(12.1), Some(13.4)]);
    }

    #[tokio::test]
    async fn test_forecast_fallback_seeded_from_current_temperature() {
        let server = MockServer::start().await;
        mount_forecast(&server, ResponseTemplate::new(500)).await;
        mount_current(&server, ResponseTemplate::new(200).set_body_json(current_body(10.0))).await;

        let response = client(&server).forecast(41.3, 69.3, 5).await;
        assert_eq!(response.source, DataSource::Fallback);
        let daily = response.daily;
        assert_eq!(daily.time.len(), 5);
        assert_eq!(daily.time[0], NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(daily.time[4], NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
        assert!(daily.temperature_2m_max.iter().all(|t| *t == Some(15.0)));
        assert!(daily.temperature_2m_min.iter().all(|t| *t == Some(8.0)));
        assert!(daily.precipitation_sum.iter().all(|p| *p == Some(0.0)));
    }

    #[tokio::test]
    async fn test_forecast_fallback_uses_default_temperature() {
        let server = MockServer::start().await;
        mount_forecast(&server, ResponseTemplate::new(500)).await;
        mount_current(&server, ResponseTemplate::new(500)).await;

        let response = client(&server).forecast(41.3, 69.3, 3).await;
        assert_eq!(response.source, DataSource::Fallback);
        assert!(response.daily.is_aligned());
        assert!(response.daily.temperature_2m_max.iter().all(|t| *t == Some(25.0)));
        assert!(response.daily.temperature_2m_min.iter().all(|t| *t == Some(18.0)));
    }

    #[tokio::test]
    async fn test_misaligned_upstream_forecast_is_synthesized() {
        let server = MockServer::start().await;
        mount_forecast(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({
                "daily": {
                    "time": ["2026-03-01", "2026-03-02"],
                    "temperature_2m_max": [12.1],
                    "temperature_2m_min": [2.0, 3.3],
                    "precipitation_sum": [0.0, 1.2]
                }
            })),
        )
        .await;
        mount_current(&server, ResponseTemplate::new(500)).await;

        let response = client(&server).forecast(41.3, 69.3, 2).await;
        assert_eq!(response.source, DataSource::Fallback);
        assert_eq!(response.daily.time.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_forecast_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("daily", DAILY_FIELDS))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;
        mount_current(&server, ResponseTemplate::new(500)).await;

        let client = client(&server);
        client.forecast(41.3, 69.3, 3).await;
        let second = client.forecast(41.3, 69.3, 3).await;
        assert_eq!(second.source, DataSource::Fallback);
    }
}
