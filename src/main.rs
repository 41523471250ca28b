// CleanSky API v0.1
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod cache;
mod config;
mod errors;
mod helpers;
mod routes;
mod services;

use cache::{CacheStore, SystemClock};
use config::AppConfig;
use routes::AppState;
use services::fetcher::ResilientFetcher;
use services::open_meteo::OpenMeteoClient;
use services::openaq::OpenAqClient;

/// CleanSky API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CleanSky API",
        version = "0.1.0",
        description = "Air-quality and weather API. Aggregates OpenAQ station readings \
            per city and proxies Open-Meteo current weather and daily forecasts. \
            Upstream responses are cached in memory for one hour; when an upstream \
            is unreachable, fallback data of the same shape is served instead.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service liveness"),
        (name = "Air quality", description = "OpenAQ countries, cities, aggregates and time series"),
        (name = "Weather", description = "Open-Meteo current weather and forecasts"),
    ),
    paths(
        routes::health::welcome,
        routes::air_quality::list_countries,
        routes::air_quality::list_cities,
        routes::air_quality::get_air_quality,
        routes::air_quality::get_measurements,
        routes::weather::get_current_weather,
        routes::weather::get_forecast,
    ),
    components(
        schemas(
            routes::health::WelcomeResponse,
            services::openaq::Country,
            services::openaq::CountryList,
            services::openaq::City,
            services::openaq::CityList,
            services::openaq::TimeSeries,
            services::aggregator::AggregatedAirQuality,
            services::open_meteo::DataSource,
            services::open_meteo::CurrentWeather,
            services::open_meteo::CurrentWeatherResponse,
            services::open_meteo::ForecastSeries,
            services::open_meteo::ForecastResponse,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; real environment variables still apply
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clean_sky_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // One cache for the whole process, shared by both upstream clients
    let cache = CacheStore::new(Arc::new(SystemClock));
    let fetcher = ResilientFetcher::new(cache);

    let openaq = OpenAqClient::new(
        fetcher.clone(),
        &config.openaq_base_url,
        config.openaq_api_key.as_deref(),
    )
    .expect("Failed to configure OpenAQ client");
    let open_meteo = OpenMeteoClient::new(fetcher, &config.open_meteo_base_url)
        .expect("Failed to configure Open-Meteo client");

    if config.openaq_api_key.is_none() {
        tracing::warn!("OPENAQ_API_KEY not set; OpenAQ requests are unauthenticated");
    }

    let app_state = AppState { openaq, open_meteo };

    // CORS: read-only API, restrict methods to GET
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(routes::health::welcome))
        .route("/countries", get(routes::air_quality::list_countries))
        .route("/cities", get(routes::air_quality::list_cities))
        .route("/air-quality", get(routes::air_quality::get_air_quality))
        .route("/measurements", get(routes::air_quality::get_measurements))
        .route("/weather", get(routes::weather::get_current_weather))
        .route("/forecast", get(routes::weather::get_forecast))
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
