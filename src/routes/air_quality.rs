//! Air-quality HTTP endpoints.
//!
//! - GET /countries
//! - GET /cities?country=XX
//! - GET /air-quality?city=Name
//! - GET /measurements?location=..&parameter=pm25&limit=100

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::{AppError, ErrorResponse};
use crate::routes::{require_non_blank, AppState};
use crate::services::aggregator::{aggregate_city, AggregatedAirQuality};
use crate::services::openaq::{CityList, CountryList, TimeSeries};

/// Upper bound for `limit` on the measurements endpoint.
const MAX_MEASUREMENTS_LIMIT: u32 = 1000;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct CitiesQuery {
    /// ISO 2-letter country code (e.g. "UZ")
    pub country: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AirQualityQuery {
    /// Name of the city
    pub city: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MeasurementsQuery {
    /// Station name
    pub location: String,
    /// Pollutant parameter (default "pm25")
    #[serde(default = "default_parameter")]
    pub parameter: String,
    /// Number of points, 1-1000 (default 100)
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_parameter() -> String {
    "pm25".to_string()
}

fn default_limit() -> u32 {
    100
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List countries with air-quality data.
///
/// Falls back to a small sample list when OpenAQ is unreachable.
#[utoipa::path(
    get,
    path = "/countries",
    tag = "Air quality",
    responses(
        (status = 200, description = "Countries", body = CountryList),
    )
)]
pub async fn list_countries(State(state): State<AppState>) -> Json<CountryList> {
    Json(state.openaq.countries().await)
}

/// List cities with air-quality data for a country, sorted by name.
#[utoipa::path(
    get,
    path = "/cities",
    tag = "Air quality",
    params(CitiesQuery),
    responses(
        (status = 200, description = "Cities in the country", body = CityList),
        (status = 400, description = "Missing country code", body = ErrorResponse),
    )
)]
pub async fn list_cities(
    State(state): State<AppState>,
    Query(params): Query<CitiesQuery>,
) -> Result<Json<CityList>, AppError> {
    let country = require_non_blank("country", &params.country)?;
    Ok(Json(state.openaq.cities(country).await))
}

/// Aggregated air quality for a city plus the raw station readings.
///
/// Averages the latest readings of up to five stations. Stations that fail
/// are left out; if the station lookup itself fails, fixed placeholder values
/// are returned.
#[utoipa::path(
    get,
    path = "/air-quality",
    tag = "Air quality",
    params(AirQualityQuery),
    responses(
        (status = 200, description = "Aggregated readings", body = AggregatedAirQuality),
        (status = 400, description = "Missing city", body = ErrorResponse),
        (status = 404, description = "No stations found for the city", body = ErrorResponse),
    )
)]
pub async fn get_air_quality(
    State(state): State<AppState>,
    Query(params): Query<AirQualityQuery>,
) -> Result<Json<AggregatedAirQuality>, AppError> {
    let city = require_non_blank("city", &params.city)?;
    let result = aggregate_city(&state.openaq, city).await?;
    Ok(Json(result))
}

/// Time series of one parameter at one station, newest first.
#[utoipa::path(
    get,
    path = "/measurements",
    tag = "Air quality",
    params(MeasurementsQuery),
    responses(
        (status = 200, description = "Measurement records", body = TimeSeries),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
    )
)]
pub async fn get_measurements(
    State(state): State<AppState>,
    Query(params): Query<MeasurementsQuery>,
) -> Result<Json<TimeSeries>, AppError> {
    let location = require_non_blank("location", &params.location)?;
    let parameter = require_non_blank("parameter", &params.parameter)?;
    if params.limit == 0 || params.limit > MAX_MEASUREMENTS_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_MEASUREMENTS_LIMIT
        )));
    }

    Ok(Json(
        state
            .openaq
            .time_series(location, parameter, params.limit)
            .await,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_state;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_countries_then_cities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/countries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"code": "UZ", "name": "Uzbekistan"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/locations"))
            .and(query_param("country", "UZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"name": "Station 1", "boundary": {"city": "Tashkent"}},
                    {"name": "Station 2", "boundary": {"city": "Bukhara"}},
                    {"name": "Station 3", "boundary": {"city": "Tashkent"}}
                ]
            })))
            .mount(&server)
            .await;

        let state = test_state(&server.uri());

        let Json(countries) = list_countries(State(state.clone())).await;
        assert_eq!(countries.countries.len(), 1);
        let code = countries.countries[0].code.clone();
        assert_eq!(code, "UZ");

        let Json(cities) = list_cities(State(state), Query(CitiesQuery { country: code }))
            .await
            .unwrap();
        let names: Vec<&str> = cities.cities.iter().map(|c| c.city.as_str()).collect();
        assert_eq!(names, vec!["Bukhara", "Tashkent"]);
    }

    #[tokio::test]
    async fn test_cities_requires_country() {
        let state = test_state("http://127.0.0.1:9");
        let result = list_cities(
            State(state),
            Query(CitiesQuery {
                country: "  ".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_air_quality_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/locations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let result = get_air_quality(
            State(test_state(&server.uri())),
            Query(AirQualityQuery {
                city: "Atlantis".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_measurements_limit_bounds() {
        let state = test_state("http://127.0.0.1:9");
        for limit in [0, MAX_MEASUREMENTS_LIMIT + 1] {
            let result = get_measurements(
                State(state.clone()),
                Query(MeasurementsQuery {
                    location: "Yunusabad".to_string(),
                    parameter: default_parameter(),
                    limit,
                }),
            )
            .await;
            assert!(matches!(result, Err(AppError::BadRequest(_))));
        }
    }

    #[test]
    fn test_measurements_query_defaults() {
        let query: MeasurementsQuery = serde_json::from_value(json!({"location": "Yunusabad"})).unwrap();
        assert_eq!(query.parameter, "pm25");
        assert_eq!(query.limit, 100);
    }
}
