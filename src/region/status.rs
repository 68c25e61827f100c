// Health record for one deployment region

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unknown until the first probe settles, then Healthy or Unhealthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionState {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionStatus {
    pub region: String,
    pub url: String,
    pub healthy: bool,
    pub state: RegionState,

    /// Duration of the most recent probe, successful or not
    pub latency_ms: f64,

    pub last_check: Option<DateTime<Utc>>,

    #[serde(rename = "error")]
    pub last_error: Option<String>,
}

impl RegionStatus {
    pub fn new(region: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            url: url.into(),
            healthy: false,
            state: RegionState::Unknown,
            latency_ms: 0.0,
            last_check: None,
            last_error: None,
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.healthy = true;
        self.state = RegionState::Healthy;
        self.latency_ms = latency.as_secs_f64() * 1000.0;
        self.last_check = Some(Utc::now());
        self.last_error = None;
    }

    pub fn record_failure(&mut self, latency: Duration, error: impl Into<String>) {
        self.healthy = false;
        self.state = RegionState::Unhealthy;
        self.latency_ms = latency.as_secs_f64() * 1000.0;
        self.last_check = Some(Utc::now());
        self.last_error = Some(error.into());
    }
}
