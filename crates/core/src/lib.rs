pub mod cache;
pub mod domain;
pub mod refresh;
pub mod resolver;
pub mod sources;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_CACHE_TTL_SECS: u64 = 300;
    const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub scored_api_base_url: Option<String>,
        pub scored_api_key: Option<String>,
        pub theme_api_base_url: Option<String>,
        pub theme_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                scored_api_base_url: std::env::var("SCORED_API_BASE_URL").ok(),
                scored_api_key: std::env::var("SCORED_API_KEY").ok(),
                theme_api_base_url: std::env::var("THEME_API_BASE_URL").ok(),
                theme_api_key: std::env::var("THEME_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_scored_api_base_url(&self) -> anyhow::Result<&str> {
            self.scored_api_base_url
                .as_deref()
                .context("SCORED_API_BASE_URL is required")
        }

        pub fn require_theme_api_base_url(&self) -> anyhow::Result<&str> {
            self.theme_api_base_url
                .as_deref()
                .context("THEME_API_BASE_URL is required")
        }
    }

    pub fn cache_ttl_from_env() -> Duration {
        let secs = std::env::var("RECOMMENDATION_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);
        Duration::from_secs(secs)
    }

    pub fn refresh_interval_from_env() -> Duration {
        let secs = std::env::var("REFRESH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn theme_fallback_enabled_from_env() -> bool {
        std::env::var("THEME_FALLBACK_ENABLED")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(false)
    }
}
