//! Runtime tunables, loaded once from environment variables with defaults
//! matching the shipped product configuration. The translation core treats
//! every value here as read-only.

use std::env;
use std::time::Duration;

/// Cache sizing and expiry.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held at once. Must be > 0.
    pub max_size: usize,
    /// Entry lifetime, measured from creation (not last access).
    pub expire_time: Duration,
    /// Interval of the background expiry sweep.
    pub cleanup_interval: Duration,
}

/// Segmentation and dispatch limits.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Segments shorter than this after trimming are treated as noise.
    pub min_length: usize,
    /// Selections longer than this are chunked before dispatch.
    pub max_length: usize,
    /// Pause between sequential per-segment gateway calls.
    pub request_delay: Duration,
}

/// Gateway transport tunables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Minimum spacing between outbound requests (token bucket).
    pub min_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub translation: TranslationConfig,
    pub gateway: GatewayConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            expire_time: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 2000,
            request_delay: Duration::from_millis(300),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".into(),
            timeout: Duration::from_secs(30),
            min_interval: Duration::from_millis(100),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            translation: TranslationConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `CACHE_MAX_SIZE`, `CACHE_EXPIRE_SECS`,
    /// `CACHE_CLEANUP_SECS`, `TRANSLATE_MIN_LENGTH`, `TRANSLATE_MAX_LENGTH`,
    /// `TRANSLATE_REQUEST_DELAY_MS`, `DEEPSEEK_BASE_URL`,
    /// `GATEWAY_TIMEOUT_SECS`, `GATEWAY_MIN_INTERVAL_MS`.
    pub fn from_env() -> Self {
        Self {
            cache: CacheConfig {
                max_size: env_parse("CACHE_MAX_SIZE", 100),
                expire_time: Duration::from_secs(env_parse("CACHE_EXPIRE_SECS", 24 * 60 * 60)),
                cleanup_interval: Duration::from_secs(env_parse("CACHE_CLEANUP_SECS", 60 * 60)),
            },
            translation: TranslationConfig {
                min_length: env_parse("TRANSLATE_MIN_LENGTH", 2),
                max_length: env_parse("TRANSLATE_MAX_LENGTH", 2000),
                request_delay: Duration::from_millis(env_parse("TRANSLATE_REQUEST_DELAY_MS", 300)),
            },
            gateway: GatewayConfig {
                base_url: env::var("DEEPSEEK_BASE_URL")
                    .unwrap_or_else(|_| "https://api.deepseek.com".into()),
                timeout: Duration::from_secs(env_parse("GATEWAY_TIMEOUT_SECS", 30)),
                min_interval: Duration::from_millis(env_parse("GATEWAY_MIN_INTERVAL_MS", 100)),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_configuration() {
        let config = Config::default();
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.cache.expire_time, Duration::from_secs(86_400));
        assert_eq!(config.cache.cleanup_interval, Duration::from_secs(3_600));
        assert_eq!(config.translation.min_length, 2);
        assert_eq!(config.translation.max_length, 2000);
        assert_eq!(config.translation.request_delay, Duration::from_millis(300));
    }

    #[test]
    fn env_parse_falls_back_on_missing_or_garbage() {
        assert_eq!(env_parse("QT_TEST_DEFINITELY_UNSET_VAR", 42usize), 42);
    }
}
