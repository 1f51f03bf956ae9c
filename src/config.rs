//! Configuration Module
//!
//! Handles loading and managing cache and server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Cache, pipeline and server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte budget of the cache store
    pub max_size: usize,
    /// Largest non-permanent entry the store accepts
    pub max_entry_size: usize,
    /// TTL in seconds of weak entries
    pub cache_life: u64,
    /// Interval in seconds between TTL sweeps
    pub expiry_check_interval: u64,
    /// Whether responses are compressed when the client accepts it
    pub compress: bool,
    /// Whether ETags are computed and checked
    pub use_etags: bool,
    /// Whether query strings are stripped from URLs before caching
    pub strip_query: bool,
    /// Quiet period in milliseconds before a file change triggers a refresh
    pub debounce_ms: u64,
    /// Whether permanent bytes count against `max_size`
    pub budget_permanent: bool,
    /// Directory URLs are resolved against
    pub asset_root: PathBuf,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_SIZE` - Cache byte budget (default: 1000000000)
    /// - `MAX_ENTRY_SIZE` - Largest cacheable entry (default: 10000000)
    /// - `CACHE_LIFE` - Weak entry TTL in seconds (default: 3600)
    /// - `EXPIRY_CHECK_INTERVAL` - TTL sweep frequency in seconds (default: 10)
    /// - `COMPRESS` - Enable gzip (default: true)
    /// - `USE_ETAGS` - Enable ETags (default: true)
    /// - `STRIP_QUERY` - Collapse query-string variants (default: false)
    /// - `DEBOUNCE_MS` - File change quiet period (default: 100)
    /// - `BUDGET_PERMANENT` - Count permanent bytes against the budget (default: true)
    /// - `ASSET_ROOT` - Directory to serve (default: .)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: env_or("MAX_SIZE", defaults.max_size),
            max_entry_size: env_or("MAX_ENTRY_SIZE", defaults.max_entry_size),
            cache_life: env_or("CACHE_LIFE", defaults.cache_life),
            expiry_check_interval: env_or("EXPIRY_CHECK_INTERVAL", defaults.expiry_check_interval),
            compress: env_or("COMPRESS", defaults.compress),
            use_etags: env_or("USE_ETAGS", defaults.use_etags),
            strip_query: env_or("STRIP_QUERY", defaults.strip_query),
            debounce_ms: env_or("DEBOUNCE_MS", defaults.debounce_ms),
            budget_permanent: env_or("BUDGET_PERMANENT", defaults.budget_permanent),
            asset_root: env::var("ASSET_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.asset_root),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// TTL sweep interval as a duration, never shorter than one second.
    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_interval.max(1))
    }

    /// Debounce window as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size: 1_000_000_000,
            max_entry_size: 10_000_000,
            cache_life: 3600,
            expiry_check_interval: 10,
            compress: true,
            use_etags: true,
            strip_query: false,
            debounce_ms: 100,
            budget_permanent: true,
            asset_root: PathBuf::from("."),
            server_port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_size, 1_000_000_000);
        assert_eq!(config.max_entry_size, 10_000_000);
        assert_eq!(config.cache_life, 3600);
        assert_eq!(config.expiry_check_interval, 10);
        assert!(config.compress);
        assert!(config.use_etags);
        assert!(!config.strip_query);
        assert!(config.budget_permanent);
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_config_durations() {
        let config = Config {
            expiry_check_interval: 2,
            debounce_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.expiry_interval(), Duration::from_secs(2));
        assert_eq!(config.debounce(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_expiry_interval_is_clamped() {
        let config = Config {
            expiry_check_interval: 0,
            ..Config::default()
        };
        assert_eq!(config.expiry_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("MAX_SIZE");
        env::remove_var("CACHE_LIFE");
        env::remove_var("COMPRESS");
        env::remove_var("SERVER_PORT");

        let config = Config::from_env();
        assert_eq!(config.max_size, 1_000_000_000);
        assert_eq!(config.cache_life, 3600);
        assert!(config.compress);
        assert_eq!(config.server_port, 3000);
    }
}
