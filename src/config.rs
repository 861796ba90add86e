use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{Duration, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Rendezvous";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_APPOINTMENT_MINUTES: i64 = 30;
const MAX_APPOINTMENT_MINUTES: i64 = 8 * 60;

/// Get the application data directory
/// ~/Rendezvous/ on all platforms; falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database location
pub fn database_path() -> PathBuf {
    app_data_dir().join("rendezvous.db")
}

/// Filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "info,rendezvous_lib=debug,tower_http=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    /// Default viewer time zone for month views.
    pub time_zone: Tz,
    pub week_start: Weekday,
    pub appointment_duration: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            database_path: database_path(),
            time_zone: Tz::UTC,
            week_start: Weekday::Sun,
            appointment_duration: Duration::minutes(DEFAULT_APPOINTMENT_MINUTES),
        }
    }
}

impl ServiceConfig {
    /// Read `RENDEZVOUS_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get("RENDEZVOUS_BIND") {
            config.bind_addr = value
                .trim()
                .parse()
                .map_err(|e: std::net::AddrParseError| invalid("RENDEZVOUS_BIND", &value, e))?;
        }
        if let Some(value) = get("RENDEZVOUS_DB") {
            config.database_path = PathBuf::from(value.trim());
        }
        if let Some(value) = get("RENDEZVOUS_TZ") {
            config.time_zone = value
                .trim()
                .parse()
                .map_err(|e| invalid("RENDEZVOUS_TZ", &value, e))?;
        }
        if let Some(value) = get("RENDEZVOUS_WEEK_START") {
            config.week_start = value
                .trim()
                .parse()
                .map_err(|_| invalid("RENDEZVOUS_WEEK_START", &value, "expected a weekday name"))?;
        }
        if let Some(value) = get("RENDEZVOUS_APPOINTMENT_MINUTES") {
            let minutes: i64 = value
                .trim()
                .parse()
                .map_err(|e| invalid("RENDEZVOUS_APPOINTMENT_MINUTES", &value, e))?;
            if !(1..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
                return Err(invalid(
                    "RENDEZVOUS_APPOINTMENT_MINUTES",
                    &value,
                    format!("must be between 1 and {MAX_APPOINTMENT_MINUTES}"),
                ));
            }
            config.appointment_duration = Duration::minutes(minutes);
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
