// Analysis orchestration facade
//
// Picks the target region, runs dispatch through the recovery manager, and
// replicates the outcome when this region is the primary.

use crate::config::InsightConfig;
use crate::dispatch::{AnalysisEngine, TaskDispatcher};
use crate::error::{OperationArgs, RecoveryManager};
use crate::region::RegionManager;
use crate::{InsightError, InsightResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one orchestrated analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Region selected to run the work
    pub region: String,

    /// Dispatch envelope, possibly wrapped by a fallback
    pub result: Value,

    /// Replication target to success flag; empty when nothing was replicated
    pub replication: BTreeMap<String, bool>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOrchestrator {
    recovery: Arc<RecoveryManager>,
    dispatcher: Arc<TaskDispatcher>,
    regions: Arc<RegionManager>,
}

impl AnalysisOrchestrator {
    pub fn new(
        recovery: Arc<RecoveryManager>,
        dispatcher: Arc<TaskDispatcher>,
        regions: Arc<RegionManager>,
    ) -> Self {
        Self {
            recovery,
            dispatcher,
            regions,
        }
    }

    /// Build every component from one loaded configuration
    pub fn from_config(
        config: &InsightConfig,
        engine: Arc<dyn AnalysisEngine>,
    ) -> InsightResult<Self> {
        Ok(Self::new(
            Arc::new(RecoveryManager::new(&config.recovery)),
            Arc::new(TaskDispatcher::new(engine, &config.dispatch)),
            Arc::new(RegionManager::new(config.region.clone())?),
        ))
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    pub fn dispatcher(&self) -> &Arc<TaskDispatcher> {
        &self.dispatcher
    }

    pub fn regions(&self) -> &Arc<RegionManager> {
        &self.regions
    }

    /// Feature-mode analysis of a whole binary.
    ///
    /// Fails when the unit itself failed or every requested feature failed;
    /// either failure goes through recovery first.
    pub async fn analyze(
        &self,
        data: Arc<[u8]>,
        features: Vec<String>,
    ) -> InsightResult<AnalysisReport> {
        let region = self.regions.get_best_region();
        tracing::info!(
            region = %region,
            features = ?features,
            size = data.len(),
            "Starting analysis"
        );

        let result = self
            .recovery
            .execute_with_recovery(
                |args: OperationArgs| {
                    let data = Arc::clone(&data);
                    let dispatcher = Arc::clone(&self.dispatcher);
                    async move {
                        let features = args.features().map(<[String]>::to_vec).unwrap_or_default();
                        let analysis = dispatcher.analyze_features(data, features).await;

                        if let Some(error) = &analysis.error {
                            return Err(InsightError::Analysis(error.clone()));
                        }
                        if !analysis.features_analyzed.is_empty()
                            && analysis.failed_features().len() == analysis.features_analyzed.len()
                        {
                            return Err(InsightError::Analysis(format!(
                                "all features failed: {}",
                                analysis.failed_features().join(", ")
                            )));
                        }
                        serde_json::to_value(&analysis).map_err(InsightError::from)
                    }
                },
                "analyze_binary",
                OperationArgs::new().with_features(features),
            )
            .await?;

        let replication = self.replicate(&result).await;
        Ok(AnalysisReport {
            region,
            result,
            replication,
        })
    }

    /// Chunk-mode analysis; fails only when every chunk failed
    pub async fn analyze_chunks(
        &self,
        data: Arc<[u8]>,
        chunk_size: usize,
        features: Vec<String>,
    ) -> InsightResult<AnalysisReport> {
        let region = self.regions.get_best_region();
        tracing::info!(
            region = %region,
            chunk_size,
            size = data.len(),
            "Starting chunked analysis"
        );

        let result = self
            .recovery
            .execute_with_recovery(
                |args: OperationArgs| {
                    let data = Arc::clone(&data);
                    let dispatcher = Arc::clone(&self.dispatcher);
                    async move {
                        let features = args.features().map(<[String]>::to_vec).unwrap_or_default();
                        let aggregate =
                            dispatcher.dispatch_chunks(data, chunk_size, features).await;

                        if aggregate.total_chunks > 0 && aggregate.successful == 0 {
                            let first =
                                aggregate.errors.values().next().cloned().unwrap_or_default();
                            return Err(InsightError::Analysis(format!(
                                "all {} chunks failed: {}",
                                aggregate.total_chunks, first
                            )));
                        }
                        serde_json::to_value(&aggregate).map_err(InsightError::from)
                    }
                },
                "analyze_chunks",
                OperationArgs::new()
                    .with_features(features)
                    .with_param("chunk_size", Value::from(chunk_size)),
            )
            .await?;

        let replication = self.replicate(&result).await;
        Ok(AnalysisReport {
            region,
            result,
            replication,
        })
    }

    async fn replicate(&self, result: &Value) -> BTreeMap<String, bool> {
        if !self.regions.is_current_region_primary() {
            tracing::debug!("Current region is not primary, skipping replication");
            return BTreeMap::new();
        }
        self.regions.replicate_to_all(result).await
    }
}
