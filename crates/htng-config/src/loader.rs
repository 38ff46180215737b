//! Configuration loader with file and environment variable support,
//! grounded on `fc-config`'s `ConfigLoader`.

use std::env;
use std::path::PathBuf;

use tracing::info;

use crate::{AppConfig, ConfigError};

const CONFIG_PATHS: &[&str] = &["config.toml", "htng.toml", "./config/htng.toml", "/etc/htng/config.toml"];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self { config_path: Some(path.into()) }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("HTNG_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS.iter().map(PathBuf::from).find(|p| p.exists())
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        if let Ok(val) = env::var("HTNG_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http.port = port;
            }
        }
        if let Ok(val) = env::var("HTNG_HTTP_HOST") {
            config.http.host = val;
        }

        if let Ok(val) = env::var("HTNG_DATABASE_URL") {
            config.database.url = val;
        }

        // Endpoint URL + credentials (spec §6).
        if let Ok(val) = env::var("HTNG_CHANNEL_WSDL_URL") {
            config.channel.wsdl_url = val;
        }
        if let Ok(val) = env::var("HTNG_CHANNEL_USERNAME") {
            config.channel.username = val;
        }
        if let Ok(val) = env::var("HTNG_CHANNEL_PASSWORD") {
            config.channel.password = val;
        }

        // Schema cache flag + TTL.
        if let Ok(val) = env::var("HTNG_SCHEMA_CACHE_ENABLED") {
            config.validation.schema_cache_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = env::var("HTNG_SCHEMA_CACHE_TTL_SECS") {
            if let Ok(ttl) = val.parse() {
                config.validation.schema_cache_ttl_secs = ttl;
            }
        }
        // Strict-validation flag.
        if let Ok(val) = env::var("HTNG_VALIDATION_STRICT") {
            config.validation.strict = val.parse().unwrap_or(true);
        }
        // Database-validation flag.
        if let Ok(val) = env::var("HTNG_VALIDATION_DATABASE") {
            config.validation.database_validation = val.parse().unwrap_or(true);
        }

        // Queue concurrency overrides.
        if let Ok(val) = env::var("HTNG_QUEUE_HIGH_CONCURRENCY") {
            config.queue.high_concurrency = val.parse().ok();
        }
        if let Ok(val) = env::var("HTNG_QUEUE_OUTBOUND_CONCURRENCY") {
            config.queue.outbound_concurrency = val.parse().ok();
        }
        if let Ok(val) = env::var("HTNG_QUEUE_INBOUND_WORK_CONCURRENCY") {
            config.queue.inbound_work_concurrency = val.parse().ok();
        }
        if let Ok(val) = env::var("HTNG_QUEUE_LOW_CONCURRENCY") {
            config.queue.low_concurrency = val.parse().ok();
        }

        // Logging channel.
        if let Ok(val) = env::var("HTNG_LOG_CHANNEL") {
            config.logging.channel = val;
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_when_no_file_and_no_env_present() {
        let loader = ConfigLoader::with_path("/nonexistent/htng.toml");
        let config = loader.load().unwrap();
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn file_values_are_read_before_env_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\nport = 9090\nhost = \"127.0.0.1\"\n").unwrap();
        let loader = ConfigLoader::with_path(file.path());
        let config = loader.load().unwrap();
        assert_eq!(config.http.port, 9090);
        assert_eq!(config.http.host, "127.0.0.1");
    }
}
