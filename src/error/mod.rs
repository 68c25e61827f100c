/// Error recovery layer for GhidraInsight orchestration
///
/// This module provides the resilience framework every fallible operation runs
/// through:
/// - Error classification into severity, recoverability and strategy
/// - Retry strategies with exponential backoff and jitter
/// - Fallback mechanisms that degrade the requested feature set
/// - A bounded recovery history with statistics
///
/// # Architecture
///
/// ```text
/// ┌─────────────────────────────────────────┐
/// │      Recovery Manager (Orchestration)   │
/// └────────────────┬────────────────────────┘
///                  │
///      ┌───────────┴───────────┐
///      ↓                       ↓
/// ┌──────────────┐      ┌──────────────┐
/// │Classification│      │   Recovery   │
/// │   (rules)    │      │   History    │
/// └─────┬────────┘      └──────────────┘
///       │
///       ↓
/// ┌─────────────────────────────────────┐
/// │     Strategy Set                    │
/// │  - Retry (backoff / jitter)         │
/// │  - Feature reduction fallback       │
/// │  - Simpler analysis fallback        │
/// └─────────────────────────────────────┘
/// ```
///
/// # Usage Example
///
/// ```rust,ignore
/// use ghidrainsight_core::error::{OperationArgs, RecoveryManager};
/// use ghidrainsight_core::RecoveryConfig;
///
/// let manager = RecoveryManager::new(&RecoveryConfig::default());
///
/// let result = manager
///     .execute_with_recovery(
///         |args: OperationArgs| async move { analyze(args).await },
///         "analyze_binary",
///         OperationArgs::new().with_features(vec!["strings".into(), "entropy".into()]),
///     )
///     .await?;
/// ```
pub mod classification;
pub mod history;
pub mod mechanisms;
pub mod recovery_manager;
pub mod retry;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use classification::{
    ClassificationRule, ClassifiedError, ErrorClassifier, ErrorContext, FailureKind,
    RecoveryOutcome, RecoveryStrategy, Severity,
};
pub use history::{ErrorStatistics, RecoveryHistory, RecoveryStats};
pub use mechanisms::{FallbackResult, FeatureReductionFallback, SimplerAnalysisFallback};
pub use recovery_manager::RecoveryManager;
pub use retry::{DelaySchedule, ExponentialBackoff, FlatJitter, RetryAlgorithm};
pub use strategy::{Attempt, OperationArgs, OperationFn, RecoveryAlgorithm, StrategySet};
