use serde::Deserialize;

use crate::services::recommendation::RecommendationSettings;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// PostgreSQL connection URL; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// JSON seed for the in-memory store
    pub seed_path: Option<String>,

    /// Redis connection URL; enables the recommendation cache
    pub redis_url: Option<String>,

    /// Books returned per recommendation request
    #[serde(default = "default_recommendation_size")]
    pub recommendation_size: usize,

    /// Nearest neighbors consulted per request
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,

    /// Most recent orders scanned by the recency fallback
    #[serde(default = "default_recent_order_window")]
    pub recent_order_window: usize,

    /// Lifetime of a cached recommendation list, in seconds
    #[serde(default = "default_recommendation_cache_ttl")]
    pub recommendation_cache_ttl: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_recommendation_size() -> usize {
    10
}

fn default_neighbor_count() -> usize {
    10
}

fn default_recent_order_window() -> usize {
    10
}

fn default_recommendation_cache_ttl() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn recommendation_settings(&self) -> RecommendationSettings {
        RecommendationSettings {
            result_size: self.recommendation_size,
            neighbor_count: self.neighbor_count,
            recent_order_window: self.recent_order_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        envy::from_iter(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.recommendation_cache_ttl, 300);
        assert_eq!(config.recommendation_settings(), RecommendationSettings::default());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/bookgarden"),
            ("RECOMMENDATION_SIZE", "5"),
            ("NEIGHBOR_COUNT", "3"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/bookgarden")
        );

        let settings = config.recommendation_settings();
        assert_eq!(settings.result_size, 5);
        assert_eq!(settings.neighbor_count, 3);
        assert_eq!(settings.recent_order_window, 10);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result: Result<Config, _> = envy::from_iter(vec![(
            "PORT".to_string(),
            "not-a-port".to_string(),
        )]);
        assert!(result.is_err());
    }
}
