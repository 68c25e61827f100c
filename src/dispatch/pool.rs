// Worker pool for chunk and feature dispatch
//
// Units run on the blocking thread pool, at most `max_workers` at a time.
// A unit that fails or panics yields a failed envelope for that unit only;
// the dispatcher never retries. Callers wrap dispatch in the recovery manager.

use super::engine::AnalysisEngine;
use super::tasks::{self, FeatureAnalysis, TaskResult, WorkerHealth, WorkerStats};
use crate::config::DispatchConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Aggregated outcome of a chunked dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAggregate {
    pub total_chunks: usize,
    pub successful: usize,
    pub failed: usize,

    /// Per-chunk envelopes ordered by offset
    pub results: Vec<TaskResult>,

    /// Offset to error message for failed chunks
    pub errors: BTreeMap<u64, String>,
}

impl ChunkAggregate {
    fn from_results(mut results: Vec<TaskResult>) -> Self {
        results.sort_by_key(|result| result.offset);

        let errors: BTreeMap<u64, String> = results
            .iter()
            .filter(|result| !result.success)
            .map(|result| {
                (
                    result.offset,
                    result.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            })
            .collect();

        Self {
            total_chunks: results.len(),
            successful: results.len() - errors.len(),
            failed: errors.len(),
            results,
            errors,
        }
    }
}

pub struct TaskDispatcher {
    engine: Arc<dyn AnalysisEngine>,
    limiter: Arc<Semaphore>,
    max_workers: usize,
    chunk_size: usize,
    worker_id: String,
}

impl TaskDispatcher {
    pub fn new(engine: Arc<dyn AnalysisEngine>, config: &DispatchConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        let worker_id = format!(
            "{}@{}",
            uuid::Uuid::new_v4().simple(),
            sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
        );

        tracing::debug!(max_workers, worker_id = %worker_id, "Task dispatcher created");

        Self {
            engine,
            limiter: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            chunk_size: config.chunk_size.max(1),
            worker_id,
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Configured chunk size used by `dispatch_chunks` callers by default
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    // Run one unit on the blocking pool under a worker permit
    async fn run_unit<T, F>(&self, unit: F) -> Result<T, String>
    where
        F: FnOnce(&dyn AnalysisEngine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.limiter)
            .acquire_owned()
            .await
            .map_err(|e| format!("worker pool closed: {}", e))?;
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            unit(engine.as_ref())
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                format!("worker panicked: {}", panic_message(e.into_panic()))
            } else {
                "worker task cancelled".to_string()
            }
        })
    }

    /// Analyze a single chunk starting at `offset`
    pub async fn analyze_chunk(
        &self,
        chunk: Vec<u8>,
        offset: u64,
        features: Vec<String>,
    ) -> TaskResult {
        self.run_unit(move |engine| tasks::analyze_chunk(engine, &chunk, offset, &features))
            .await
            .unwrap_or_else(|error| {
                tracing::error!(offset, error = %error, "Chunk task failed");
                TaskResult::failed(offset, error)
            })
    }

    /// Analyze a whole binary with a feature list
    pub async fn analyze_features(
        &self,
        data: Arc<[u8]>,
        features: Vec<String>,
    ) -> FeatureAnalysis {
        self.run_unit(move |engine| tasks::analyze_features(engine, &data, &features))
            .await
            .unwrap_or_else(|error| {
                tracing::error!(error = %error, "Feature task failed");
                FeatureAnalysis::failed(error)
            })
    }

    /// Split `data` into contiguous chunks and analyze them concurrently
    pub async fn dispatch_chunks(
        &self,
        data: Arc<[u8]>,
        chunk_size: usize,
        features: Vec<String>,
    ) -> ChunkAggregate {
        let chunk_size = chunk_size.max(1);
        let features: Arc<[String]> = features.into();

        tracing::info!(
            size = data.len(),
            chunk_size,
            chunks = data.len().div_ceil(chunk_size),
            "Dispatching chunked analysis"
        );

        let units = (0..data.len()).step_by(chunk_size).map(|start| {
            let end = (start + chunk_size).min(data.len());
            let data = Arc::clone(&data);
            let features = Arc::clone(&features);
            let offset = start as u64;

            async move {
                self.run_unit(move |engine| {
                    tasks::analyze_chunk(engine, &data[start..end], offset, &features)
                })
                .await
                .unwrap_or_else(|error| {
                    tracing::error!(offset, error = %error, "Chunk task failed");
                    TaskResult::failed(offset, error)
                })
            }
        });

        let aggregate = ChunkAggregate::from_results(join_all(units).await);
        tracing::info!(
            total = aggregate.total_chunks,
            successful = aggregate.successful,
            failed = aggregate.failed,
            "Chunked analysis complete"
        );
        aggregate
    }

    /// Run one feature-mode unit per feature set; results keep submission order
    pub async fn dispatch_feature_sets(
        &self,
        data: Arc<[u8]>,
        feature_sets: Vec<Vec<String>>,
    ) -> Vec<FeatureAnalysis> {
        tracing::info!(sets = feature_sets.len(), "Dispatching feature sets");

        let units = feature_sets
            .into_iter()
            .map(|features| self.analyze_features(Arc::clone(&data), features));
        join_all(units).await
    }

    pub fn health_check(&self) -> WorkerHealth {
        tasks::health_check(&self.worker_id)
    }

    pub async fn worker_stats(&self) -> WorkerStats {
        let worker_id = self.worker_id.clone();
        let fallback_id = worker_id.clone();

        tokio::task::spawn_blocking(move || tasks::worker_stats(&worker_id))
            .await
            .unwrap_or_else(|e| WorkerStats {
                hostname: fallback_id,
                platform: std::env::consts::OS.to_string(),
                cpu_count: None,
                memory_total: None,
                memory_available: None,
                disk_usage: None,
                load_average: None,
                error: Some(format!("stats collection failed: {}", e)),
            })
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("max_workers", &self.max_workers)
            .field("chunk_size", &self.chunk_size)
            .field("worker_id", &self.worker_id)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
