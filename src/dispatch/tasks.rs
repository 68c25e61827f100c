// Task bodies executed by workers
//
// Each function here is one unit of distributed work. Engine failures are
// caught at the unit boundary and reported inside the envelope; nothing in
// this file returns an error to the dispatcher.

use super::engine::AnalysisEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use sysinfo::{Disks, System};

/// Result of analyzing one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub offset: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<String, Value>,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn failed(offset: u64, error: impl Into<String>) -> Self {
        Self {
            offset,
            chunk_size: None,
            features: Vec::new(),
            results: BTreeMap::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Result of running a feature list over a whole binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAnalysis {
    #[serde(default)]
    pub features_analyzed: Vec<String>,

    /// Feature name to engine output, or `{"error": ...}` for failed features
    #[serde(default)]
    pub results: BTreeMap<String, Value>,

    /// True unless the unit itself failed; per-feature errors do not count
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeatureAnalysis {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            features_analyzed: Vec::new(),
            results: BTreeMap::new(),
            success: false,
            binary_size: None,
            error: Some(error.into()),
        }
    }

    /// Features whose entry is an inline error record
    pub fn failed_features(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, value)| is_error_record(value))
            .map(|(feature, _)| feature.as_str())
            .collect()
    }
}

/// Inline failure record: an object whose only key is a string `error`.
/// Engine output that merely contains an `error` field is not a failure.
fn is_error_record(value: &Value) -> bool {
    match value.as_object() {
        Some(fields) => fields.len() == 1 && fields.get("error").is_some_and(Value::is_string),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub status: String,
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Host resource counters. Counter fields are absent when collection failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub hostname: String,
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_total: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_available: Option<u64>,

    /// Percent used on the disk holding `/` (or the largest disk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_usage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_average: Option<[f64; 3]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Analyze one chunk. Only the first requested feature is run.
pub fn analyze_chunk(
    engine: &dyn AnalysisEngine,
    chunk: &[u8],
    offset: u64,
    features: &[String],
) -> TaskResult {
    tracing::info!(offset, size = chunk.len(), "Analyzing binary chunk");

    let feature = match features.first() {
        Some(feature) => feature,
        None => {
            tracing::error!(offset, "Chunk analysis failed: no features requested");
            return TaskResult::failed(offset, "no features requested");
        }
    };

    match engine.run_feature(feature, chunk) {
        Ok(result) => TaskResult {
            offset,
            chunk_size: Some(chunk.len()),
            features: features.to_vec(),
            results: BTreeMap::from([(feature.clone(), result)]),
            success: true,
            error: None,
        },
        Err(e) => {
            tracing::error!(offset, feature = %feature, error = %e, "Chunk analysis failed");
            TaskResult::failed(offset, e.to_string())
        }
    }
}

/// Run every feature over the whole binary, isolating per-feature failures
pub fn analyze_features(
    engine: &dyn AnalysisEngine,
    data: &[u8],
    features: &[String],
) -> FeatureAnalysis {
    tracing::info!(features = ?features, size = data.len(), "Running feature analysis");

    let mut results = BTreeMap::new();
    for feature in features {
        let outcome = match engine.run_feature(feature, data) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(feature = %feature, error = %e, "Feature analysis failed");
                json!({ "error": e.to_string() })
            }
        };
        results.insert(feature.clone(), outcome);
    }

    FeatureAnalysis {
        features_analyzed: features.to_vec(),
        results,
        success: true,
        binary_size: Some(data.len()),
        error: None,
    }
}

pub fn health_check(worker_id: &str) -> WorkerHealth {
    WorkerHealth {
        status: "healthy".to_string(),
        worker_id: worker_id.to_string(),
        timestamp: Utc::now(),
    }
}

/// Collect host counters, degrading to identity plus an error when the
/// platform exposes none
pub fn worker_stats(worker_id: &str) -> WorkerStats {
    let hostname = System::host_name().unwrap_or_else(|| worker_id.to_string());
    let platform = platform_description();

    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return WorkerStats::degraded(
            hostname,
            platform,
            "resource counters unsupported on this platform",
        );
    }

    let mut sys = System::new();
    sys.refresh_memory();
    if sys.total_memory() == 0 {
        return WorkerStats::degraded(hostname, platform, "memory counters unavailable");
    }

    let load = System::load_average();

    WorkerStats {
        hostname,
        platform,
        cpu_count: Some(num_cpus::get()),
        memory_total: Some(sys.total_memory()),
        memory_available: Some(sys.available_memory()),
        disk_usage: root_disk_usage(),
        load_average: Some([load.one, load.five, load.fifteen]),
        error: None,
    }
}

impl WorkerStats {
    fn degraded(hostname: String, platform: String, error: &str) -> Self {
        tracing::warn!(error, "Worker stats degraded");
        Self {
            hostname,
            platform,
            cpu_count: None,
            memory_total: None,
            memory_available: None,
            disk_usage: None,
            load_average: None,
            error: Some(error.to_string()),
        }
    }
}

fn platform_description() -> String {
    let name = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
    match System::os_version() {
        Some(version) => format!("{}-{}-{}", name, version, std::env::consts::ARCH),
        None => format!("{}-{}", name, std::env::consts::ARCH),
    }
}

fn root_disk_usage() -> Option<f64> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.list().iter().max_by_key(|disk| disk.total_space()))?;

    let total = disk.total_space();
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(disk.available_space());
    Some((used as f64 / total as f64 * 1000.0).round() / 10.0)
}
