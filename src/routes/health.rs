use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Welcome response.
#[derive(Debug, Serialize, ToSchema)]
pub struct WelcomeResponse {
    /// Greeting
    pub message: String,
    /// API version
    pub version: String,
}

/// Welcome endpoint.
///
/// Always answers, without touching any upstream, so it doubles as a
/// liveness probe.
#[utoipa::path(
    get,
    path = "/",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up", body = WelcomeResponse),
    )
)]
pub async fn welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the CleanSky API!".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
