use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DATABASE_PATH_KEY: &str = "SCREENER_DATABASE_PATH";
pub const MARKET_DATA_URL_KEY: &str = "SCREENER_MARKET_DATA_URL";
pub const MARKET_DATA_COOKIE_URL_KEY: &str = "SCREENER_MARKET_DATA_COOKIE_URL";
pub const MARKET_DATA_TIMEOUT_KEY: &str = "SCREENER_MARKET_DATA_TIMEOUT_SECS";
pub const BIND_ADDR_KEY: &str = "SCREENER_BIND_ADDR";

pub const DEFAULT_MARKET_DATA_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_MARKET_DATA_COOKIE_URL: &str = "https://fc.yahoo.com";
pub const DEFAULT_MARKET_DATA_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSettings {
    pub database_path: PathBuf,
    pub market_data_url: String,
    pub market_data_cookie_url: String,
    pub market_data_timeout: Duration,
    pub bind_addr: SocketAddr,
}

impl DashboardSettings {
    /// Builds settings from `SCREENER_*` keys. `database_override` wins over
    /// the `SCREENER_DATABASE_PATH` entry when present.
    pub fn from_settings_map(
        settings: &HashMap<String, String>,
        database_override: Option<PathBuf>,
    ) -> Result<Self> {
        let database_path = match database_override {
            Some(path) => path,
            None => PathBuf::from(require_setting(settings, DATABASE_PATH_KEY)?),
        };
        let market_data_url =
            setting_http_url(settings, MARKET_DATA_URL_KEY, DEFAULT_MARKET_DATA_URL)?;
        let market_data_cookie_url = setting_http_url(
            settings,
            MARKET_DATA_COOKIE_URL_KEY,
            DEFAULT_MARKET_DATA_COOKIE_URL,
        )?;
        let timeout_secs = setting_u64_in_range(
            settings,
            MARKET_DATA_TIMEOUT_KEY,
            DEFAULT_MARKET_DATA_TIMEOUT_SECS,
            MIN_TIMEOUT_SECS,
            MAX_TIMEOUT_SECS,
        )?;
        let bind_addr = setting_socket_addr(settings, BIND_ADDR_KEY, DEFAULT_BIND_ADDR)?;

        Ok(Self {
            database_path,
            market_data_url: market_data_url.trim_end_matches('/').to_string(),
            market_data_cookie_url: market_data_cookie_url.to_string(),
            market_data_timeout: Duration::from_secs(timeout_secs),
            bind_addr,
        })
    }

    /// Reads the process environment, after loading an optional `.env` file.
    pub fn from_env(database_override: Option<PathBuf>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let settings: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with("SCREENER_"))
            .collect();
        Self::from_settings_map(&settings, database_override)
    }
}

fn require_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    optional_setting(settings, key).ok_or_else(|| anyhow!("Missing required setting {}", key))
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn setting_http_url<'a>(
    settings: &'a HashMap<String, String>,
    key: &str,
    default: &'a str,
) -> Result<&'a str> {
    let raw = optional_setting(settings, key).unwrap_or(default);
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Err(anyhow!(
            "Setting {} must be an http(s) URL (value: {})",
            key,
            raw
        ));
    }
    Ok(raw)
}

fn setting_u64_in_range(
    settings: &HashMap<String, String>,
    key: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(default);
    };
    let value = raw
        .parse::<u64>()
        .map_err(|_| anyhow!("Setting {} must be a whole number (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    if value > max {
        return Err(anyhow!(
            "Setting {} must be <= {} (value: {})",
            key,
            max,
            raw
        ));
    }
    Ok(value)
}

fn setting_socket_addr(
    settings: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<SocketAddr> {
    let raw = optional_setting(settings, key).unwrap_or(default);
    raw.parse::<SocketAddr>().map_err(|_| {
        anyhow!(
            "Setting {} must be a socket address like 127.0.0.1:8501 (value: {})",
            key,
            raw
        )
    })
}
