/// Integration tests for the recovery manager
///
/// Exercises the public recovery contract: transparent recovery, propagation
/// of the original failure, fallback envelopes and statistics.
use ghidrainsight_core::error::{
    ClassificationRule, FallbackResult, OperationArgs, RecoveryOutcome, RecoveryStrategy, Severity,
};
use ghidrainsight_core::{InsightError, RecoveryConfig, RecoveryManager};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_fail_once_then_succeed_is_transparent() {
    let manager = RecoveryManager::new(&RecoveryConfig::default());
    let calls = AtomicU32::new(0);

    let result = manager
        .execute_with_recovery(
            |_args| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(InsightError::Timeout("first call hung".into()))
                    } else {
                        Ok(json!({"functions": 42}))
                    }
                }
            },
            "list_functions",
            OperationArgs::new(),
        )
        .await
        .unwrap();

    assert_eq!(result, json!({"functions": 42}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_retry_exhausts_max_retries() {
    let config = RecoveryConfig {
        max_retries: 5,
        ..Default::default()
    };
    let manager = RecoveryManager::new(&config);
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let result = manager
        .execute_with_recovery(
            |_args| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(InsightError::Timeout("still hung".into())) }
            },
            "decompile",
            OperationArgs::new(),
        )
        .await;

    assert!(matches!(result, Err(InsightError::Timeout(ref m)) if m == "still hung"));
    // One original call plus max_retries retries
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    // 1 + 2 + 4 + 8 + 16 seconds of backoff
    assert!(started.elapsed() >= Duration::from_secs(31));
    assert!(started.elapsed() < Duration::from_secs(32));

    let history = manager.history().snapshot();
    assert_eq!(history[0].retry_count(), 5);
    assert_eq!(history[0].outcome, RecoveryOutcome::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_caps_at_thirty_seconds() {
    let config = RecoveryConfig {
        max_retries: 7,
        ..Default::default()
    };
    let manager = RecoveryManager::new(&config);
    let started = Instant::now();

    let _ = manager
        .execute_with_recovery(
            |_args| async { Err(InsightError::Timeout("hung".into())) },
            "decompile",
            OperationArgs::new(),
        )
        .await;

    // 1 + 2 + 4 + 8 + 16 + 30 + 30
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(91) && elapsed < Duration::from_secs(92));
}

#[tokio::test]
async fn test_zero_retry_budget_propagates_immediately() {
    let config = RecoveryConfig {
        max_retries: 0,
        ..Default::default()
    };
    let manager = RecoveryManager::new(&config);
    let calls = AtomicU32::new(0);

    let result = manager
        .execute_with_recovery(
            |_args| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(InsightError::Network("unreachable".into())) }
            },
            "fetch_symbols",
            OperationArgs::new(),
        )
        .await;

    assert!(matches!(result, Err(InsightError::Network(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_memory_fallback_envelope() {
    let manager = RecoveryManager::new(&RecoveryConfig::default());
    let features: Vec<String> = ["strings", "entropy", "functions"]
        .iter()
        .map(|f| f.to_string())
        .collect();

    let result = manager
        .execute_with_recovery(
            |args: OperationArgs| async move {
                let requested = args.features().map(<[String]>::to_vec).unwrap_or_default();
                if requested.len() > 1 {
                    Err(InsightError::custom("MemoryError", "cannot allocate"))
                } else {
                    Ok(json!({ "ran": requested }))
                }
            },
            "analyze_binary",
            OperationArgs::new().with_features(features),
        )
        .await
        .unwrap();

    let fallback = FallbackResult::from_value(&result).unwrap();
    assert_eq!(fallback.reason, "memory_error");
    assert_eq!(fallback.reduced_features, Some(vec!["strings".to_string()]));
    assert_eq!(fallback.result, json!({"ran": ["strings"]}));
}

#[tokio::test]
async fn test_analysis_failure_escalates_by_default() {
    let manager = RecoveryManager::new(&RecoveryConfig::default());
    let calls = AtomicU32::new(0);

    let result = manager
        .execute_with_recovery(
            |_args| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(InsightError::Analysis("unsupported architecture".into())) }
            },
            "analyze_binary",
            OperationArgs::new().with_features(vec!["decompile".to_string()]),
        )
        .await;

    assert!(matches!(result, Err(InsightError::Analysis(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_analysis_rule_enables_simpler_fallback() {
    let mut manager = RecoveryManager::new(&RecoveryConfig::default());
    manager.classifier_mut().push_rule(ClassificationRule::new(
        &["analysis"],
        Severity::Medium,
        true,
        RecoveryStrategy::Fallback,
    ));

    let result = manager
        .execute_with_recovery(
            |args: OperationArgs| async move {
                let requested = args.features().map(<[String]>::to_vec).unwrap_or_default();
                if requested.iter().any(|f| f == "decompile") {
                    Err(InsightError::Analysis("decompiler crashed".into()))
                } else {
                    Ok(json!({ "ran": requested }))
                }
            },
            "analyze_binary",
            OperationArgs::new().with_features(vec!["decompile".to_string()]),
        )
        .await
        .unwrap();

    assert_eq!(result["fallback_applied"], json!(true));
    assert_eq!(result["reason"], json!("analysis_error"));
    assert_eq!(result["result"]["ran"], json!(["basic_info", "strings"]));
}

#[tokio::test(start_paused = true)]
async fn test_statistics_over_mixed_failures() {
    let manager = RecoveryManager::new(&RecoveryConfig::default());

    for _ in 0..2 {
        let calls = AtomicU32::new(0);
        let _ = manager
            .execute_with_recovery(
                |_args| {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if call == 0 {
                            Err(InsightError::Database("deadlock".into()))
                        } else {
                            Ok(json!(null))
                        }
                    }
                },
                "store_results",
                OperationArgs::new(),
            )
            .await;
    }
    let _ = manager
        .execute_with_recovery(
            |_args| async { Err(InsightError::Config("bad".into())) },
            "configure",
            OperationArgs::new(),
        )
        .await;

    let stats = manager.error_statistics();
    assert_eq!(stats.total_errors, 3);
    assert_eq!(stats.error_types["database"], 2);
    assert_eq!(stats.error_types["config"], 1);
    assert_eq!(stats.severities["high"], 2);
    assert_eq!(stats.recovery_stats.successful, 2);
    assert_eq!(stats.recovery_stats.failed, 1);
    assert_eq!(stats.most_common_error.as_deref(), Some("database"));

    manager.clear_error_history();
    assert_eq!(manager.error_statistics().total_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_whole_recovery() {
    let manager = RecoveryManager::new(&RecoveryConfig::default());
    let started = Instant::now();

    let result = manager
        .execute_with_deadline(
            |_args| async { Err(InsightError::Network("down".into())) },
            "sync",
            OperationArgs::new(),
            Duration::from_secs(5),
        )
        .await;

    assert!(matches!(result, Err(InsightError::Timeout(_))));
    assert!(started.elapsed() <= Duration::from_secs(6));
}
