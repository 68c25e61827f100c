// Configuration for the resilience and orchestration layer
//
// Values are layered: built-in defaults, then an optional config file, then
// GHIDRAINSIGHT__SECTION__KEY environment variables. Everything is read once
// at startup and never mutated afterwards.

use crate::{InsightError, InsightResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "GHIDRAINSIGHT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub recovery: RecoveryConfig,
    pub dispatch: DispatchConfig,
    pub region: RegionConfig,
    pub logging: LoggingConfig,
}

/// Retry budgets and delay schedules for the recovery strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Retries allowed per classified error
    pub max_retries: u32,

    /// Bound on the recovery history
    pub history_size: usize,

    /// First delay of the exponential schedules
    pub backoff_base_secs: f64,

    /// Cap for plain exponential backoff (timeouts)
    pub backoff_cap_secs: f64,

    /// Cap for jittered exponential backoff (network errors)
    pub jittered_backoff_cap_secs: f64,

    /// Relative jitter applied to the jittered exponential schedule
    pub jitter_factor: f64,

    /// Flat jitter window for database errors
    pub flat_jitter_min_secs: f64,
    pub flat_jitter_max_secs: f64,

    /// Feature set used by the simpler-analysis fallback
    pub fallback_features: Vec<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            history_size: 1000,
            backoff_base_secs: 1.0,
            backoff_cap_secs: 30.0,
            jittered_backoff_cap_secs: 60.0,
            jitter_factor: 0.1,
            flat_jitter_min_secs: 1.0,
            flat_jitter_max_secs: 5.0,
            fallback_features: vec!["basic_info".to_string(), "strings".to_string()],
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_workers: usize,
    pub chunk_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().max(1),
            chunk_size: 1024 * 1024,
        }
    }
}

/// Multi-region deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub enabled: bool,
    pub regions: Vec<String>,
    pub current_region: String,
    pub primary_region: Option<String>,
    pub replication_enabled: bool,
    pub replication_regions: Vec<String>,

    /// Total time allowed for one cross-region HTTP call
    pub cross_region_timeout_secs: f64,

    /// Period of the background health monitor
    pub health_check_interval_secs: u64,

    /// Base URL pattern; `{region}` is replaced with the region id
    pub url_template: String,

    /// Explicit base URLs that take precedence over `url_template`
    pub region_urls: HashMap<String, String>,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            regions: Vec::new(),
            current_region: "us-east-1".to_string(),
            primary_region: None,
            replication_enabled: false,
            replication_regions: Vec::new(),
            cross_region_timeout_secs: 30.0,
            health_check_interval_secs: 60,
            url_template: "https://ghidrainsight-{region}.example.com".to_string(),
            region_urls: HashMap::new(),
        }
    }
}

impl RegionConfig {
    /// Base URL of a region, without a trailing slash
    pub fn region_url(&self, region: &str) -> String {
        let url = self
            .region_urls
            .get(region)
            .cloned()
            .unwrap_or_else(|| self.url_template.replace("{region}", region));
        url.trim_end_matches('/').to_string()
    }

    /// Per-call timeout for probes and replication; must be positive and finite
    pub fn cross_region_timeout(&self) -> InsightResult<Duration> {
        match Duration::try_from_secs_f64(self.cross_region_timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(InsightError::Config(format!(
                "region.cross_region_timeout_secs must be positive, got {}",
                self.cross_region_timeout_secs
            ))),
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is not set
    pub level: String,
    pub json: bool,

    /// Optional log file, rotated daily
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl InsightConfig {
    /// Load configuration from `path` (required when given) or the default
    /// location (optional), then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> InsightResult<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(default_path).required(false));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("region.regions")
                .with_list_parse_key("region.replication_regions")
                .with_list_parse_key("recovery.fallback_features"),
        );

        let config: InsightConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            regions = config.region.regions.len(),
            max_retries = config.recovery.max_retries,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// `<config dir>/ghidrainsight/config.toml` for the current user
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "ghidrainsight", "ghidrainsight")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject settings the orchestration layer cannot run with
    pub fn validate(&self) -> InsightResult<()> {
        let recovery = &self.recovery;

        if recovery.history_size == 0 {
            return Err(InsightError::Config(
                "recovery.history_size must be greater than zero".to_string(),
            ));
        }

        let delays = [
            ("backoff_base_secs", recovery.backoff_base_secs),
            ("backoff_cap_secs", recovery.backoff_cap_secs),
            ("jittered_backoff_cap_secs", recovery.jittered_backoff_cap_secs),
            ("jitter_factor", recovery.jitter_factor),
            ("flat_jitter_min_secs", recovery.flat_jitter_min_secs),
            ("flat_jitter_max_secs", recovery.flat_jitter_max_secs),
        ];
        for (name, value) in delays {
            if !value.is_finite() || value < 0.0 {
                return Err(InsightError::Config(format!(
                    "recovery.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if recovery.jitter_factor > 1.0 {
            return Err(InsightError::Config(format!(
                "recovery.jitter_factor must be at most 1.0, got {}",
                recovery.jitter_factor
            )));
        }

        if recovery.flat_jitter_min_secs >= recovery.flat_jitter_max_secs {
            return Err(InsightError::Config(
                "recovery.flat_jitter_min_secs must be below flat_jitter_max_secs".to_string(),
            ));
        }

        if self.dispatch.max_workers == 0 {
            return Err(InsightError::Config(
                "dispatch.max_workers must be greater than zero".to_string(),
            ));
        }

        if self.dispatch.chunk_size == 0 {
            return Err(InsightError::Config(
                "dispatch.chunk_size must be greater than zero".to_string(),
            ));
        }

        let region = &self.region;
        region.cross_region_timeout()?;

        if region.enabled {
            if !region.regions.contains(&region.current_region) {
                return Err(InsightError::Config(format!(
                    "current region '{}' is not listed in region.regions",
                    region.current_region
                )));
            }

            if let Some(unknown) = region
                .replication_regions
                .iter()
                .find(|target| !region.regions.contains(target))
            {
                return Err(InsightError::Config(format!(
                    "replication target '{}' is not listed in region.regions",
                    unknown
                )));
            }
        }

        Ok(())
    }
}
