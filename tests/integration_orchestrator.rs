/// End-to-end tests for the orchestration facade
mod common;

use common::{region_config, RegionServer, ScriptedEngine};
use ghidrainsight_core::{AnalysisOrchestrator, InsightConfig, InsightError};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_primary_region_replicates_report() {
    let local = RegionServer::healthy().await;
    let replica = RegionServer::healthy().await;

    let mut config = InsightConfig::default();
    config.region = region_config(&[
        ("us-east-1", local.url.as_str()),
        ("eu-west-1", replica.url.as_str()),
    ]);
    config.region.replication_enabled = true;
    config.region.primary_region = Some("us-east-1".to_string());
    config.region.replication_regions = vec!["eu-west-1".to_string()];
    config.validate().unwrap();

    let orchestrator =
        AnalysisOrchestrator::from_config(&config, Arc::new(ScriptedEngine::new())).unwrap();
    orchestrator.regions().check_all_regions().await;

    let report = orchestrator
        .analyze(Arc::from(vec![0x90u8; 64]), vec!["strings".to_string()])
        .await
        .unwrap();

    assert_eq!(report.replication.get("eu-west-1"), Some(&true));
    let received = replica.replicated();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0.as_deref(), Some("us-east-1"));
    assert_eq!(received[0].1, report.result);
}

#[tokio::test]
async fn test_secondary_region_does_not_replicate() {
    let local = RegionServer::healthy().await;
    let primary = RegionServer::healthy().await;

    let mut config = InsightConfig::default();
    config.region = region_config(&[
        ("eu-west-1", local.url.as_str()),
        ("us-east-1", primary.url.as_str()),
    ]);
    config.region.replication_enabled = true;
    config.region.primary_region = Some("us-east-1".to_string());
    config.region.replication_regions = vec!["us-east-1".to_string()];

    let orchestrator =
        AnalysisOrchestrator::from_config(&config, Arc::new(ScriptedEngine::new())).unwrap();
    let report = orchestrator
        .analyze(Arc::from(vec![1u8; 8]), vec!["strings".to_string()])
        .await
        .unwrap();

    assert!(report.replication.is_empty());
    assert!(primary.replicated().is_empty());
}

#[tokio::test]
async fn test_routes_to_best_region() {
    let slow = RegionServer::healthy().await;
    slow.set_health_delay(std::time::Duration::from_millis(200));
    let fast = RegionServer::healthy().await;

    let mut config = InsightConfig::default();
    config.region = region_config(&[
        ("us-east-1", slow.url.as_str()),
        ("eu-west-1", fast.url.as_str()),
    ]);

    let orchestrator =
        AnalysisOrchestrator::from_config(&config, Arc::new(ScriptedEngine::new())).unwrap();
    orchestrator.regions().check_all_regions().await;

    let report = orchestrator
        .analyze(Arc::from(vec![1u8; 8]), vec!["basic_info".to_string()])
        .await
        .unwrap();
    assert_eq!(report.region, "eu-west-1");
}

#[tokio::test]
async fn test_chunked_analysis_report() {
    let config = InsightConfig::default();
    let engine = Arc::new(ScriptedEngine::new().fail_on("entropy", "model missing"));
    let orchestrator = AnalysisOrchestrator::from_config(&config, engine).unwrap();

    let report = orchestrator
        .analyze_chunks(Arc::from(vec![0u8; 100]), 40, vec!["strings".to_string()])
        .await
        .unwrap();
    assert_eq!(report.result["total_chunks"], json!(3));

    let failed = orchestrator
        .analyze_chunks(Arc::from(vec![0u8; 100]), 40, vec!["entropy".to_string()])
        .await;
    assert!(matches!(failed, Err(InsightError::Analysis(ref m)) if m.contains("model missing")));
}
