pub mod air_quality;
pub mod health;
pub mod weather;

use crate::services::open_meteo::OpenMeteoClient;
use crate::services::openaq::OpenAqClient;

/// Shared application state. Both clients hold the same cache store.
#[derive(Clone)]
pub struct AppState {
    pub openaq: OpenAqClient,
    pub open_meteo: OpenMeteoClient,
}

/// Trimmed value of a required text parameter, rejecting blanks.
pub(crate) fn require_non_blank<'a>(name: &str, value: &'a str) -> Result<&'a str, crate::errors::AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::errors::AppError::BadRequest(format!(
            "{} must not be empty",
            name
        )));
    }
    Ok(trimmed)
}

/// State whose clients both point at `base_url` (a mock server).
#[cfg(test)]
pub(crate) fn test_state(base_url: &str) -> AppState {
    use crate::cache::{CacheStore, ManualClock};
    use crate::services::fetcher::ResilientFetcher;

    let clock = ManualClock::new("2026-03-01T08:00:00Z".parse().unwrap());
    let fetcher = ResilientFetcher::new(CacheStore::new(clock));
    AppState {
        openaq: OpenAqClient::new(fetcher.clone(), base_url, None).unwrap(),
        open_meteo: OpenMeteoClient::new(fetcher, base_url).unwrap(),
    }
}
