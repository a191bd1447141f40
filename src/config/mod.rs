//! Runtime configuration loaded from the environment.
//!
//! Every option is read and validated into a [`Config`]. The binary applies a
//! `.env` file from the working directory first, without overriding variables
//! that are already set.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::upstream::VISUAL_CROSSING_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which [`CacheStore`](crate::cache::CacheStore) backs the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected \"redis\" or \"memory\", got \"{other}\"")),
        }
    }
}

/// Fully validated settings for the proxy.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub cache_ttl: Duration,
    pub weather_api_key: String,
    pub weather_api_base_url: String,
    pub upstream_timeout: Duration,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub trust_proxy: bool,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 43_200;
    pub const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
    pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 3_600;
    pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Builds a config from explicit `(name, value)` pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let lookup = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        let redis_url = match lookup("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
                let port: u16 = parse_or(&lookup, "REDIS_PORT", 6379)?;
                format!("redis://{host}:{port}/")
            }
        };

        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", Self::DEFAULT_PORT)?,
            cache_backend: parse_or(&lookup, "CACHE_BACKEND", CacheBackend::Redis)?,
            redis_url,
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "CACHE_TTL_SECS",
                Self::DEFAULT_CACHE_TTL_SECS,
            )?),
            weather_api_key: lookup("WEATHER_API_KEY").ok_or(ConfigError::Missing {
                name: "WEATHER_API_KEY",
            })?,
            weather_api_base_url: lookup("WEATHER_API_BASE_URL")
                .unwrap_or_else(|| VISUAL_CROSSING_BASE_URL.to_owned()),
            upstream_timeout: Duration::from_secs(parse_or(
                &lookup,
                "UPSTREAM_TIMEOUT_SECS",
                Self::DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?),
            rate_limit_max: parse_or(&lookup, "RATE_LIMIT_MAX", Self::DEFAULT_RATE_LIMIT_MAX)?,
            rate_limit_window: Duration::from_secs(parse_or(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                Self::DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?),
            trust_proxy: lookup("TRUST_PROXY").is_some_and(|v| parse_bool(&v)),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    name,
                    value: value.to_string(),
                    reason: "must be greater than zero".to_owned(),
                })
            } else {
                Ok(())
            }
        };

        positive("CACHE_TTL_SECS", self.cache_ttl.as_secs())?;
        positive("UPSTREAM_TIMEOUT_SECS", self.upstream_timeout.as_secs())?;
        positive("RATE_LIMIT_MAX", u64::from(self.rate_limit_max))?;
        positive("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window.as_secs())?;
        Ok(())
    }

    /// `host:port` to bind the listener to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}
