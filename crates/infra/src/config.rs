//! Process configuration from the environment.

use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_RECENT_NOTIFICATIONS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    /// Postgres when set, in-memory store otherwise.
    pub database_url: Option<String>,
    /// Redis when set, in-memory cache otherwise.
    pub redis_url: Option<String>,
    /// Lifetime of cached product detail and list responses.
    pub cache_ttl: Duration,
    /// Default page size of the recent-notifications listing.
    pub recent_notifications: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            redis_url: None,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            recent_notifications: DEFAULT_RECENT_NOTIFICATIONS,
        }
    }
}

impl Settings {
    /// Read settings from the process environment. Missing or malformed
    /// values fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, so tests need not touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let bind_addr = parsed(&lookup, "LUMBERYARD_BIND_ADDR", DEFAULT_BIND_ADDR, defaults.bind_addr);

        let database_url = non_empty(lookup("DATABASE_URL"));
        if database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
        }

        let redis_url = non_empty(lookup("REDIS_URL"));
        if redis_url.is_none() {
            tracing::warn!("REDIS_URL not set; using in-process cache");
        }

        let ttl_secs = parsed(
            &lookup,
            "LUMBERYARD_CACHE_TTL_SECS",
            &DEFAULT_CACHE_TTL_SECS.to_string(),
            DEFAULT_CACHE_TTL_SECS,
        );
        let recent_notifications = parsed(
            &lookup,
            "LUMBERYARD_RECENT_NOTIFICATIONS",
            &DEFAULT_RECENT_NOTIFICATIONS.to_string(),
            DEFAULT_RECENT_NOTIFICATIONS,
        );

        Self {
            bind_addr,
            database_url,
            redis_url,
            cache_ttl: Duration::from_secs(ttl_secs),
            recent_notifications,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_text: &str,
    default: T,
) -> T {
    match non_empty(lookup(key)) {
        None => {
            tracing::warn!("{key} not set; using default {default_text}");
            default
        }
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("{key}={raw} is not valid; using default {default_text}");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(settings(&[]), Settings::default());
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let s = settings(&[
            ("LUMBERYARD_BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", " postgres://localhost/lumberyard "),
            ("REDIS_URL", ""),
            ("LUMBERYARD_CACHE_TTL_SECS", "60"),
            ("LUMBERYARD_RECENT_NOTIFICATIONS", "5"),
        ]);
        assert_eq!(s.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/lumberyard"));
        assert_eq!(s.redis_url, None);
        assert_eq!(s.cache_ttl, Duration::from_secs(60));
        assert_eq!(s.recent_notifications, 5);
    }

    #[test]
    fn malformed_values_fall_back() {
        let s = settings(&[("LUMBERYARD_BIND_ADDR", "nowhere"), ("LUMBERYARD_CACHE_TTL_SECS", "-1")]);
        assert_eq!(s.bind_addr, Settings::default().bind_addr);
        assert_eq!(s.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
    }
}
