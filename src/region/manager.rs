// Region manager: health tracking, latency routing and replication
//
// One status slot per configured region, created at startup and never added
// or removed. Each slot is written only by its own region's probe, so the
// lock per slot is never contended across regions.

use super::status::RegionStatus;
use crate::config::RegionConfig;
use crate::{InsightError, InsightResult};
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Header naming the origin region on replication requests
pub const ORIGIN_HEADER: &str = "X-Region";

#[derive(Debug)]
struct RegionSlot {
    region: String,
    status: RwLock<RegionStatus>,
}

impl RegionSlot {
    fn read(&self) -> RwLockReadGuard<'_, RegionStatus> {
        self.status.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegionStatus> {
        self.status
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
pub struct RegionManager {
    config: RegionConfig,
    client: reqwest::Client,
    regions: Vec<RegionSlot>,
}

impl RegionManager {
    /// Build the manager and its HTTP client. No region is tracked when
    /// multi-region support is disabled.
    pub fn new(config: RegionConfig) -> InsightResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.cross_region_timeout()?)
            .user_agent(concat!("ghidrainsight/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut regions: Vec<RegionSlot> = Vec::new();
        if config.enabled {
            for region in &config.regions {
                if regions.iter().any(|slot| &slot.region == region) {
                    tracing::warn!(region = %region, "Ignoring duplicate region");
                    continue;
                }
                regions.push(RegionSlot {
                    region: region.clone(),
                    status: RwLock::new(RegionStatus::new(region, config.region_url(region))),
                });
            }
        }

        tracing::info!(
            enabled = config.enabled,
            regions = regions.len(),
            current = %config.current_region,
            "Region manager initialized"
        );

        Ok(Self {
            config,
            client,
            regions,
        })
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    pub fn current_region(&self) -> &str {
        &self.config.current_region
    }

    fn slot(&self, region: &str) -> Option<&RegionSlot> {
        self.regions.iter().find(|slot| slot.region == region)
    }

    fn unknown_region(region: &str) -> InsightError {
        InsightError::Config(format!("unknown region '{}'", region))
    }

    /// Probe `<url>/health`, record the outcome, and return the latency.
    ///
    /// Latency is recorded for failed probes too.
    pub async fn probe_region(&self, region: &str) -> InsightResult<Duration> {
        let slot = self
            .slot(region)
            .ok_or_else(|| Self::unknown_region(region))?;
        let url = format!("{}/health", slot.read().url);

        let started = Instant::now();
        let outcome = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(InsightError::Network(format!(
                "HTTP {}",
                response.status().as_u16()
            ))),
            Err(e) => Err(InsightError::from(e)),
        };
        let latency = started.elapsed();

        match outcome {
            Ok(()) => {
                slot.write().record_success(latency);
                tracing::debug!(
                    region,
                    latency_ms = latency.as_millis() as u64,
                    "Region healthy"
                );
                Ok(latency)
            }
            Err(e) => {
                slot.write().record_failure(latency, e.to_string());
                tracing::warn!(region, error = %e, "Region health check failed");
                Err(e)
            }
        }
    }

    pub async fn check_region_health(&self, region: &str) -> bool {
        self.probe_region(region).await.is_ok()
    }

    /// Probe every region concurrently; waits for all probes to settle
    pub async fn check_all_regions(&self) -> BTreeMap<String, bool> {
        let probes = self.regions.iter().map(|slot| async move {
            let healthy = self.check_region_health(&slot.region).await;
            (slot.region.clone(), healthy)
        });

        let results: BTreeMap<String, bool> = join_all(probes).await.into_iter().collect();
        tracing::info!(
            healthy = results.values().filter(|h| **h).count(),
            total = results.len(),
            "Region health sweep complete"
        );
        results
    }

    /// Healthy region with the lowest latency; the first one wins ties.
    /// Falls back to the current region when none is healthy.
    pub fn get_best_region(&self) -> String {
        let mut best: Option<(&str, f64)> = None;
        for slot in &self.regions {
            let status = slot.read();
            if !status.healthy {
                continue;
            }
            if best.map_or(true, |(_, latency)| status.latency_ms < latency) {
                best = Some((slot.region.as_str(), status.latency_ms));
            }
        }

        match best {
            Some((region, _)) => region.to_string(),
            None => self.config.current_region.clone(),
        }
    }

    /// POST `data` to a region's replication endpoint
    pub async fn try_replicate_to_region(&self, region: &str, data: &Value) -> InsightResult<()> {
        if !self.config.replication_enabled {
            return Err(InsightError::Config("replication is disabled".to_string()));
        }

        let slot = self
            .slot(region)
            .ok_or_else(|| Self::unknown_region(region))?;
        let url = format!("{}/api/replicate", slot.read().url);

        let response = self
            .client
            .post(&url)
            .header(ORIGIN_HEADER, &self.config.current_region)
            .json(data)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(InsightError::Network(format!(
                "HTTP {}",
                response.status().as_u16()
            )))
        }
    }

    pub async fn replicate_to_region(&self, region: &str, data: &Value) -> bool {
        if !self.config.replication_enabled {
            tracing::debug!(region, "Replication disabled, skipping");
            return false;
        }

        match self.try_replicate_to_region(region, data).await {
            Ok(()) => {
                tracing::info!(region, "Replicated data");
                true
            }
            Err(e) => {
                tracing::error!(region, error = %e, "Replication failed");
                false
            }
        }
    }

    /// Replicate to every replication target in turn. A failed target never
    /// stops the remaining ones.
    pub async fn replicate_to_all(&self, data: &Value) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        if !self.config.replication_enabled {
            return results;
        }

        for region in &self.config.replication_regions {
            let replicated = self.replicate_to_region(region, data).await;
            results.insert(region.clone(), replicated);
        }
        results
    }

    /// Snapshot of every region in configured order
    pub fn region_status(&self) -> Vec<RegionStatus> {
        self.regions.iter().map(|slot| slot.read().clone()).collect()
    }

    /// Primary is a static configuration fact
    pub fn is_current_region_primary(&self) -> bool {
        if !self.config.enabled || !self.config.replication_enabled {
            return true;
        }
        match &self.config.primary_region {
            Some(primary) => primary == &self.config.current_region,
            None => true,
        }
    }

    /// Run `check_all_regions` every `interval` until the handle is aborted
    pub fn spawn_health_monitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.check_all_regions().await;
            }
        })
    }
}
