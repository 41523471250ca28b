/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Sent as `X-API-Key` on every OpenAQ request when set.
    pub openaq_api_key: Option<String>,
    pub openaq_base_url: String,
    pub open_meteo_base_url: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            openaq_api_key: std::env::var("OPENAQ_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            openaq_base_url: std::env::var("OPENAQ_BASE_URL")
                .unwrap_or_else(|_| "https://api.openaq.org/v3".to_string()),
            open_meteo_base_url: std::env::var("OPEN_METEO_BASE_URL")
                .unwrap_or_else(|_| "https://api.open-meteo.com/v1/forecast".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        // NOTE: set_var/remove_var races with other tests reading the
        // environment. No other test in this crate touches these variables.
        unsafe {
            std::env::set_var("OPENAQ_API_KEY", "  ");
            std::env::remove_var("OPENAQ_BASE_URL");
            std::env::remove_var("OPEN_METEO_BASE_URL");
            std::env::remove_var("PORT");
        }

        let config = AppConfig::from_env();

        assert_eq!(config.port, 8080);
        assert_eq!(config.openaq_api_key, None);
        assert_eq!(config.openaq_base_url, "https://api.openaq.org/v3");
        assert!(config.open_meteo_base_url.contains("open-meteo.com"));
    }
}
