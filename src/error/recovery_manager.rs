/// Recovery manager - the single choke point for fallible operations
///
/// `execute_with_recovery` runs an operation, and on failure:
/// - classifies the failure and logs it by severity
/// - resolves a recovery algorithm for the error's strategy and kind
/// - records the error as pending, drives that algorithm, and settles the
///   history entry with the outcome (failed if the call is cancelled first)
///
/// The caller sees either a result (possibly wrapped by a fallback) or the
/// original failure. One manager is built at startup and shared by handle;
/// every call owns its own `ClassifiedError`, so concurrent calls are safe.
use super::classification::{
    ClassifiedError, ErrorClassifier, ErrorContext, RecoveryOutcome, Severity,
};
use super::history::{ErrorStatistics, RecoveryHistory};
use super::strategy::{OperationArgs, OperationFn, RecoveryAlgorithm, StrategySet};
use crate::config::RecoveryConfig;
use crate::{InsightError, InsightResult};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug)]
pub struct RecoveryManager {
    classifier: ErrorClassifier,
    strategies: StrategySet,
    history: RecoveryHistory,
}

impl RecoveryManager {
    /// Manager with the built-in rules and default strategy registrations
    pub fn new(config: &RecoveryConfig) -> Self {
        Self::with_parts(
            ErrorClassifier::with_max_retries(config.max_retries),
            StrategySet::from_config(config),
            RecoveryHistory::new(config.history_size),
        )
    }

    pub fn with_parts(
        classifier: ErrorClassifier,
        strategies: StrategySet,
        history: RecoveryHistory,
    ) -> Self {
        Self {
            classifier,
            strategies,
            history,
        }
    }

    /// Run `operation(args)`, recovering from classified failures.
    ///
    /// A first-try success is returned untouched and leaves no history entry.
    pub async fn execute_with_recovery<F, Fut>(
        &self,
        operation: F,
        operation_name: &str,
        args: OperationArgs,
    ) -> InsightResult<Value>
    where
        F: Fn(OperationArgs) -> Fut + Send + Sync,
        Fut: Future<Output = InsightResult<Value>> + Send,
    {
        let original = match operation(args.clone()).await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        let context = ErrorContext::capture(operation_name, &args);
        let mut classified = self.classifier.classify(&original, context);
        log_classified(&classified);
        handle_kind(&classified);

        self.history.push(classified.clone());
        let record = PendingRecord::new(&self.history, classified.id);

        let started = Instant::now();
        let recovered = match self.select_algorithm(&classified) {
            Some(algorithm) => {
                tracing::debug!(
                    operation = operation_name,
                    strategy = %classified.strategy,
                    algorithm = algorithm.name(),
                    "Attempting recovery"
                );
                let attempt = OperationFn::new(&operation);
                algorithm.recover(&mut classified, &attempt, args).await
            }
            None => None,
        };

        match recovered {
            Some(result) => {
                tracing::info!(
                    operation = operation_name,
                    kind = %classified.kind,
                    strategy = %classified.strategy,
                    retries = classified.retry_count(),
                    elapsed = %humantime::format_duration(truncate_millis(started.elapsed())),
                    "Recovered from failure"
                );
                classified.outcome = RecoveryOutcome::Recovered;
                record.settle(&classified);
                Ok(result)
            }
            None => {
                tracing::error!(
                    operation = operation_name,
                    kind = %classified.kind,
                    strategy = %classified.strategy,
                    error = %original,
                    "Recovery failed, propagating original error"
                );
                classified.outcome = RecoveryOutcome::Failed;
                record.settle(&classified);
                Err(original)
            }
        }
    }

    /// `execute_with_recovery` bounded by an outer deadline covering every
    /// attempt and backoff sleep
    pub async fn execute_with_deadline<F, Fut>(
        &self,
        operation: F,
        operation_name: &str,
        args: OperationArgs,
        deadline: Duration,
    ) -> InsightResult<Value>
    where
        F: Fn(OperationArgs) -> Fut + Send + Sync,
        Fut: Future<Output = InsightResult<Value>> + Send,
    {
        tokio::time::timeout(
            deadline,
            self.execute_with_recovery(operation, operation_name, args),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                operation = operation_name,
                deadline = %humantime::format_duration(deadline),
                "Recovery deadline exceeded"
            );
            InsightError::Timeout(format!(
                "{} did not complete within {}",
                operation_name,
                humantime::format_duration(deadline)
            ))
        })?
    }

    fn select_algorithm(&self, classified: &ClassifiedError) -> Option<Arc<dyn RecoveryAlgorithm>> {
        if !classified.recoverable {
            tracing::debug!(
                kind = %classified.kind,
                "Error is not recoverable"
            );
            return None;
        }

        let algorithm = self
            .strategies
            .resolve(classified.strategy, &classified.kind);
        if algorithm.is_none() {
            tracing::debug!(
                kind = %classified.kind,
                strategy = %classified.strategy,
                "No recovery algorithm registered"
            );
        }
        algorithm
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut ErrorClassifier {
        &mut self.classifier
    }

    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    pub fn strategies_mut(&mut self) -> &mut StrategySet {
        &mut self.strategies
    }

    pub fn history(&self) -> &RecoveryHistory {
        &self.history
    }

    pub fn error_statistics(&self) -> ErrorStatistics {
        self.history.statistics()
    }

    pub fn clear_error_history(&self) {
        self.history.clear();
        tracing::info!("Error history cleared");
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new(&RecoveryConfig::default())
    }
}

// History entry of a failure whose recovery has not settled. Dropping it
// unsettled (the recovery future was cancelled) marks the entry failed.
struct PendingRecord<'h> {
    history: &'h RecoveryHistory,
    id: Uuid,
    settled: bool,
}

impl<'h> PendingRecord<'h> {
    fn new(history: &'h RecoveryHistory, id: Uuid) -> Self {
        Self {
            history,
            id,
            settled: false,
        }
    }

    fn settle(mut self, error: &ClassifiedError) {
        self.history.settle(error);
        self.settled = true;
    }
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.history.set_outcome(self.id, RecoveryOutcome::Failed);
        }
    }
}

fn truncate_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}

fn log_classified(error: &ClassifiedError) {
    let operation = error.context().operation();
    match error.severity {
        Severity::Low => tracing::debug!(
            operation,
            kind = %error.kind,
            strategy = %error.strategy,
            "{}",
            error.message
        ),
        Severity::Medium => tracing::warn!(
            operation,
            kind = %error.kind,
            strategy = %error.strategy,
            "{}",
            error.message
        ),
        Severity::High => tracing::error!(
            operation,
            kind = %error.kind,
            strategy = %error.strategy,
            "{}",
            error.message
        ),
        Severity::Critical => tracing::error!(
            operation,
            kind = %error.kind,
            strategy = %error.strategy,
            critical = true,
            "{}",
            error.message
        ),
    }
}

// Kind-specific diagnostics
fn handle_kind(error: &ClassifiedError) {
    let operation = error.context().operation();
    let kind = error.kind.as_str();

    if kind.contains("timeout") {
        tracing::warn!(operation, "Operation timed out");
    } else if kind.contains("memory") {
        tracing::error!(operation, "Memory exhausted during operation");
    } else if kind.contains("network") || kind.contains("connection") {
        tracing::warn!(operation, "Network failure during operation");
    } else if kind.contains("analysis") {
        tracing::error!(operation, "Analysis failed");
    } else if kind.contains("database") {
        tracing::error!(operation, "Database failure during operation");
    }
}
