//! Runtime configuration, read from the environment.

use figment::{providers::Env, Figment};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Catalog search endpoint; the query goes into its `s` parameter.
    #[serde(default = "default_catalog_url")]
    pub catalog_url: Url,
    /// Delivery endpoint; takes `id` and `quality` parameters.
    #[serde(default = "default_delivery_url")]
    pub delivery_url: Url,
    /// Quality hint for candidates whose catalog entry carries none.
    #[serde(default = "default_quality")]
    pub default_quality: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_port() -> u16 {
    8080
}

fn default_catalog_url() -> Url {
    Url::parse("https://tidal-api.binimum.org/search/").expect("valid default catalog url")
}

fn default_delivery_url() -> Url {
    Url::parse("https://tidal-api.binimum.org/track/").expect("valid default delivery url")
}

fn default_quality() -> String {
    "LOSSLESS".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_resolve_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}
