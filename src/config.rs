//! Optional TOML configuration for reporting behavior.

use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::clock::{Clock, DEFAULT_TIMEZONE};
use crate::service::DEFAULT_RECENT_ACTIVITY_LIMIT;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportingConfig {
    /// IANA timezone used for calendar-day boundaries.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            recent_activity_limit: default_recent_activity_limit(),
        }
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.name().to_string()
}

fn default_recent_activity_limit() -> usize {
    DEFAULT_RECENT_ACTIVITY_LIMIT
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.reporting.timezone()?;
        Ok(config)
    }

    pub fn clock(&self) -> Result<Clock> {
        Ok(Clock::system(self.reporting.timezone()?))
    }
}

impl ReportingConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| anyhow::anyhow!("unknown timezone {:?}: {err}", self.timezone))
    }
}
