//! Weather HTTP endpoints.
//!
//! - GET /weather?lat=..&lon=..
//! - GET /forecast?lat=..&lon=..&days=14

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::{AppError, ErrorResponse};
use crate::routes::AppState;
use crate::services::open_meteo::{CurrentWeatherResponse, ForecastResponse};

/// Open-Meteo serves at most 16 forecast days.
const MAX_FORECAST_DAYS: u8 = 16;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WeatherQuery {
    /// Latitude (WGS84)
    pub lat: f64,
    /// Longitude (WGS84)
    pub lon: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForecastQuery {
    /// Latitude (WGS84)
    pub lat: f64,
    /// Longitude (WGS84)
    pub lon: f64,
    /// Number of days, 1-16 (default 14)
    #[serde(default = "default_days")]
    pub days: u8,
}

fn default_days() -> u8 {
    14
}

/// Reject NaN/Inf and out-of-range coordinates.
fn validate_coordinates(lat: f64, lon: f64) -> Result<(), AppError> {
    // Check is_finite() first: NaN passes both range comparisons below
    if !lat.is_finite() || !lon.is_finite() {
        return Err(AppError::BadRequest(
            "lat and lon must be finite numbers".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(AppError::BadRequest("lat must be between -90 and 90".to_string()));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::BadRequest("lon must be between -180 and 180".to_string()));
    }
    Ok(())
}

/// Current weather (temperature, wind speed, weather code).
///
/// `source` is "fallback" and `current_weather` null when Open-Meteo is
/// unreachable.
#[utoipa::path(
    get,
    path = "/weather",
    tag = "Weather",
    params(WeatherQuery),
    responses(
        (status = 200, description = "Current weather", body = CurrentWeatherResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
    )
)]
pub async fn get_current_weather(
    State(state): State<AppState>,
    Query(params): Query<WeatherQuery>,
) -> Result<Json<CurrentWeatherResponse>, AppError> {
    validate_coordinates(params.lat, params.lon)?;
    Ok(Json(
        state.open_meteo.current_weather(params.lat, params.lon).await,
    ))
}

/// Daily forecast (max/min temperature, precipitation).
///
/// When Open-Meteo is unreachable a plausible series is synthesized from the
/// current temperature and tagged `source: "fallback"`.
#[utoipa::path(
    get,
    path = "/forecast",
    tag = "Weather",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Daily forecast", body = ForecastResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
    )
)]
pub async fn get_forecast(
    State(state): State<AppState>,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<ForecastResponse>, AppError> {
    validate_coordinates(params.lat, params.lon)?;
    if params.days == 0 || params.days > MAX_FORECAST_DAYS {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {}",
            MAX_FORECAST_DAYS
        )));
    }

    Ok(Json(
        state
            .open_meteo
            .forecast(params.lat, params.lon, params.days)
            .await,
    ))
}
