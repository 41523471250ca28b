//! Plausible multi-day forecast used when the forecast upstream is down.
//!
//! This is not a forecast model: values are the base temperature shifted by
//! fixed offsets plus bounded noise. The noise source is injected so tests can
//! pin it.

use chrono::{Days, NaiveDate};
use rand::Rng;

use crate::helpers::round_1dp;
use crate::services::open_meteo::ForecastSeries;

/// Temperature assumed when even the current-weather lookup fails.
pub const DEFAULT_BASE_TEMPERATURE: f64 = 20.0;

const MAX_TEMP_OFFSET: f64 = 5.0;
const MIN_TEMP_OFFSET: f64 = -2.0;
const TEMP_JITTER: f64 = 3.0;
const MAX_PRECIPITATION_MM: f64 = 5.0;

/// Uniform random numbers in a closed range.
pub trait RandomSource: Send + Sync {
    fn uniform(&self, min: f64, max: f64) -> f64;
}

/// Thread-local RNG, unseeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn uniform(&self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Generate `days` daily entries starting at `today`.
pub fn synthesize(
    today: NaiveDate,
    days: usize,
    base_temperature: f64,
    rng: &dyn RandomSource,
) -> ForecastSeries {
    let mut series = ForecastSeries::with_capacity(days);

    for i in 0..days {
        let date = today
            .checked_add_days(Days::new(i as u64))
            .unwrap_or(NaiveDate::MAX);
        let max_temp =
            base_temperature + MAX_TEMP_OFFSET + rng.uniform(-TEMP_JITTER, TEMP_JITTER);
        let min_temp =
            base_temperature + MIN_TEMP_OFFSET + rng.uniform(-TEMP_JITTER, TEMP_JITTER);
        let precipitation = rng.uniform(0.0, MAX_PRECIPITATION_MM).max(0.0);

        series.push(
            date,
            Some(round_1dp(max_temp)),
            Some(round_1dp(min_temp)),
            Some(round_1dp(precipitation)),
        );
    }

    series
}
