// SPDX-License-Identifier: PMPL-1.0-or-later
//! Gateway configuration.
//!
//! Built from JSON, from `DATAGATE_*` environment variables, or in code.
//! Nothing here is global: each `DataStoreManager` owns its config.

use std::path::PathBuf;
use std::time::Duration;

use datagate_query::DEFAULT_COUNT;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GatewayError;
use crate::selector::AppScope;

/// A named driver from the registry and the apps it claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDriverConfig {
    pub name: String,
    #[serde(default)]
    pub apps: AppScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// `count` used when a find does not set one.
    pub default_count: usize,
    /// Share one document database across apps.
    pub unified_database: Option<String>,
    pub reaper_interval_secs: u64,
    /// Idle time after which a cached per-app connection is closed.
    pub idle_timeout_secs: u64,
    pub custom_driver: Option<CustomDriverConfig>,
    /// redb file for the embedded driver; in memory when unset.
    pub embedded_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_COUNT,
            unified_database: None,
            reaper_interval_secs: 30,
            idle_timeout_secs: 20,
            custom_driver: None,
            embedded_path: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_json(json: &str) -> Result<Self, GatewayError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GatewayError::InvalidConfig(format!("bad config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `DATAGATE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `from_env` with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(count) = var("DATAGATE_DEFAULT_COUNT") {
            config.default_count = parse_number("DATAGATE_DEFAULT_COUNT", &count)?;
        }
        if let Some(secs) = var("DATAGATE_REAPER_INTERVAL_SECS") {
            config.reaper_interval_secs = parse_number("DATAGATE_REAPER_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = var("DATAGATE_IDLE_TIMEOUT_SECS") {
            config.idle_timeout_secs = parse_number("DATAGATE_IDLE_TIMEOUT_SECS", &secs)?;
        }
        config.unified_database = var("DATAGATE_UNIFIED_DB");
        config.embedded_path = var("DATAGATE_EMBEDDED_PATH").map(PathBuf::from);

        let only = var("DATAGATE_DRIVER_APPS").map(|v| split_list(&v));
        let except = var("DATAGATE_DRIVER_EXCLUDE_APPS").map(|v| split_list(&v));
        match var("DATAGATE_DRIVER") {
            Some(name) => {
                let apps = match (only, except) {
                    (Some(_), Some(_)) => {
                        return Err(GatewayError::InvalidConfig(
                            "DATAGATE_DRIVER_APPS and DATAGATE_DRIVER_EXCLUDE_APPS are exclusive".into(),
                        ))
                    }
                    (Some(apps), None) => AppScope::Only(apps),
                    (None, Some(apps)) => AppScope::Except(apps),
                    (None, None) => AppScope::All,
                };
                config.custom_driver = Some(CustomDriverConfig { name, apps });
            }
            None if only.is_some() || except.is_some() => {
                warn!("driver app lists set without DATAGATE_DRIVER; ignoring");
            }
            None => {}
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.default_count == 0 {
            return Err(GatewayError::InvalidConfig("default_count must be positive".into()));
        }
        if self.reaper_interval_secs == 0 || self.idle_timeout_secs == 0 {
            return Err(GatewayError::InvalidConfig(
                "reaper interval and idle timeout must be positive".into(),
            ));
        }
        if let Some(custom) = &self.custom_driver {
            if custom.name.trim().is_empty() {
                return Err(GatewayError::InvalidConfig("custom driver name is empty".into()));
            }
        }
        if self.unified_database.as_deref().is_some_and(str::is_empty) {
            return Err(GatewayError::InvalidConfig("unified database name is empty".into()));
        }
        Ok(())
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, GatewayError> {
    value
        .parse()
        .map_err(|_| GatewayError::InvalidConfig(format!("{name} must be a number, got '{value}'")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
