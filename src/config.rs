//! Runtime configuration.
//!
//! Every field has a default, so an empty or missing config file is valid.
//! Values are read from TOML:
//!
//! ```toml
//! [stats]
//! expiration_secs = 3600
//! background_refresh_fraction = 0.75
//!
//! [dashboard]
//! debounce_ms = 750
//! ```

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stats: StatsCacheConfig,
    pub dashboard: DashboardConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsCacheConfig {
    /// Age after which a cached aggregate is no longer served.
    pub expiration_secs: u64,
    /// Fraction of the expiration window after which a hit also schedules a
    /// background refresh.
    pub background_refresh_fraction: f64,
    pub refresh_delay_ms: u64,
    /// Upper bound of the random extra delay added to `refresh_delay_ms`.
    pub refresh_jitter_ms: u64,
    /// Page size used while paginating projects during recomputation.
    pub page_size: u32,
}

impl Default for StatsCacheConfig {
    fn default() -> Self {
        Self {
            expiration_secs: 60 * 60,
            background_refresh_fraction: 0.75,
            refresh_delay_ms: 1_000,
            refresh_jitter_ms: 2_000,
            page_size: 200,
        }
    }
}

impl StatsCacheConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        let fraction = if self.background_refresh_fraction.is_finite() {
            self.background_refresh_fraction.clamp(0.0, 1.0)
        } else {
            Self::default().background_refresh_fraction
        };
        self.expiration().mul_f64(fraction)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.expiration_secs > 0, "stats.expiration_secs must be positive");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.background_refresh_fraction),
            "stats.background_refresh_fraction must be within 0.0..=1.0, got {}",
            self.background_refresh_fraction
        );
        anyhow::ensure!(self.page_size > 0, "stats.page_size must be positive");
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub debounce_ms: u64,
    pub default_page_size: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 750,
            default_page_size: 25,
        }
    }
}

impl DashboardConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.stats.validate()?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.stats.expiration_secs, 3600);
        assert_eq!(config.dashboard.debounce_ms, 750);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [stats]
            expiration_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.stats.expiration(), Duration::from_secs(120));
        assert_eq!(config.stats.refresh_threshold(), Duration::from_secs(90));
        assert_eq!(config.stats.page_size, 200);
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let err = Config::from_toml(
            r#"
            [stats]
            background_refresh_fraction = 1.5
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("background_refresh_fraction"));
    }

    #[test]
    fn non_finite_fraction_uses_default_threshold() {
        let config = StatsCacheConfig {
            background_refresh_fraction: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.refresh_threshold(), Duration::from_secs(45 * 60));
    }
}
