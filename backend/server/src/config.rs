use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub request_timeout: Duration,
    pub seed_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            store_backend: try_load("STORE_BACKEND", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            request_timeout: Duration::from_secs(try_load("REQUEST_TIMEOUT_SECS", "10")?),
            seed_dir: var("SEED_DIR").ok().map(PathBuf::from),
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    parse(
        key,
        var(key).unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        }),
    )
}

fn parse<T: FromStr>(key: &str, raw: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        }
    })
}
