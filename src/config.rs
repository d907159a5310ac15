//! Environment configuration

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::gateway::{HttpGateway, DEFAULT_CLASSIFY_URL, DEFAULT_IDENTITY_URL};
use crate::places::PlaceFilter;
use crate::submission::DEFAULT_MIN_DURATION;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub identity_url: String,
    pub classify_url: String,
    /// Browser key for the places lookup widget
    pub places_api_key: String,
    pub min_loading: Duration,
    pub upstream_timeout: Duration,
    pub max_sessions: usize,
    pub place_filter: PlaceFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            classify_url: DEFAULT_CLASSIFY_URL.to_string(),
            places_api_key: String::new(),
            min_loading: DEFAULT_MIN_DURATION,
            upstream_timeout: Duration::from_secs(30),
            max_sessions: 10_000,
            place_filter: PlaceFilter::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let places_api_key = lookup("PLACES_API_KEY").unwrap_or_default();
        if places_api_key.is_empty() {
            warn!("PLACES_API_KEY not set, location lookup will not load");
        }

        let place_filter = match lookup("SKIN_FLOW_PLACE_DENYLIST") {
            Some(list) => {
                info!("SKIN_FLOW_PLACE_DENYLIST set, replacing default denylist");
                PlaceFilter::from_list(&list)
            }
            None => defaults.place_filter,
        };

        Ok(Self {
            host: lookup("SKIN_FLOW_HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "SKIN_FLOW_PORT", defaults.port)?,
            identity_url: lookup("SKIN_FLOW_IDENTITY_URL").unwrap_or(defaults.identity_url),
            classify_url: lookup("SKIN_FLOW_CLASSIFY_URL").unwrap_or(defaults.classify_url),
            places_api_key,
            min_loading: Duration::from_millis(parse(
                &lookup,
                "SKIN_FLOW_MIN_LOADING_MS",
                defaults.min_loading.as_millis() as u64,
            )?),
            upstream_timeout: Duration::from_secs(parse(
                &lookup,
                "SKIN_FLOW_UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout.as_secs(),
            )?),
            max_sessions: parse(&lookup, "SKIN_FLOW_MAX_SESSIONS", defaults.max_sessions)?,
            place_filter,
        })
    }

    pub fn gateway(&self) -> HttpGateway {
        HttpGateway::new(&self.identity_url, &self.classify_url, self.upstream_timeout)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        },
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
