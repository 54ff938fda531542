use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub content_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let content_path = std::env::var("CONTENT_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            log_level,
            content_path,
            engine: EngineConfig::from_env(),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Tunables for the practice engine. `Default` is what tests and the
/// in-process engine use; `from_env` overlays the process environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval given to a question the first time it is missed.
    pub initial_review_interval_days: u32,
    /// Attempts needed before a skill is classified by accuracy.
    pub mastery_min_attempts: u32,
    pub retry: RetryPolicy,
    pub due_items_default_limit: usize,
    pub due_items_max_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_review_interval_days: 2,
            mastery_min_attempts: 3,
            retry: RetryPolicy::default(),
            due_items_default_limit: 20,
            due_items_max_limit: 100,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let due_items_max_limit =
            env_u64("DUE_ITEMS_MAX_LIMIT", defaults.due_items_max_limit as u64).max(1) as usize;

        Self {
            initial_review_interval_days: env_u32(
                "REVIEW_INITIAL_INTERVAL_DAYS",
                defaults.initial_review_interval_days,
            )
            .clamp(1, 365),
            mastery_min_attempts: env_u32("MASTERY_MIN_ATTEMPTS", defaults.mastery_min_attempts)
                .max(1),
            retry: RetryPolicy {
                max_attempts: env_u32("WRITE_MAX_RETRIES", defaults.retry.max_attempts).max(1),
                backoff: Duration::from_millis(env_u64(
                    "WRITE_RETRY_BACKOFF_MS",
                    defaults.retry.backoff.as_millis() as u64,
                )),
            },
            due_items_default_limit: (env_u64(
                "DUE_ITEMS_DEFAULT_LIMIT",
                defaults.due_items_default_limit as u64,
            ) as usize)
                .clamp(1, due_items_max_limit),
            due_items_max_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str, default: bool) -> bool {
    let Ok(value) = std::env::var(key) else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_helpers_fall_back_on_garbage() {
        std::env::set_var("ACT_TEST_FLAG_ON", " Yes ");
        std::env::set_var("ACT_TEST_FLAG_BAD", "maybe");
        std::env::set_var("ACT_TEST_NUMBER_BAD", "-4");

        assert!(env_bool("ACT_TEST_FLAG_ON", false));
        assert!(env_bool("ACT_TEST_FLAG_BAD", true));
        assert!(!env_bool("ACT_TEST_FLAG_UNSET", false));
        assert_eq!(env_u32("ACT_TEST_NUMBER_BAD", 7), 7);
        assert_eq!(env_u64("ACT_TEST_NUMBER_UNSET", 9), 9);
    }

    #[test]
    fn engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.initial_review_interval_days, 2);
        assert_eq!(config.mastery_min_attempts, 3);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.due_items_default_limit <= config.due_items_max_limit);
    }
}
