/// Feature reduction - halve the requested feature list and retry once
///
/// Used for memory failures: the first half of the feature list is kept so
/// the cheapest, most commonly requested features still run.
use super::FallbackResult;
use crate::error::classification::ClassifiedError;
use crate::error::strategy::{Attempt, OperationArgs, RecoveryAlgorithm};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct FeatureReductionFallback;

impl FeatureReductionFallback {
    pub fn new() -> Self {
        Self
    }

    /// Reduced feature list, or `None` if there is nothing to drop
    pub fn reduce(features: &[String]) -> Option<Vec<String>> {
        if features.len() <= 1 {
            return None;
        }
        Some(features[..features.len() / 2].to_vec())
    }
}

#[async_trait]
impl RecoveryAlgorithm for FeatureReductionFallback {
    fn name(&self) -> &'static str {
        "reduce_features"
    }

    async fn recover(
        &self,
        error: &mut ClassifiedError,
        operation: &dyn Attempt,
        mut args: OperationArgs,
    ) -> Option<Value> {
        let reduced = match args.features().and_then(Self::reduce) {
            Some(reduced) => reduced,
            None => {
                tracing::debug!(
                    operation = error.context().operation(),
                    "No feature list to reduce"
                );
                return None;
            }
        };

        tracing::info!(
            operation = error.context().operation(),
            kind = %error.kind,
            features = ?reduced,
            "Retrying with reduced feature set"
        );
        args.set_features(reduced.clone());

        match operation.attempt(args).await {
            Ok(result) => Some(FallbackResult::reduced(result, reduced).into_value()),
            Err(fallback_error) => {
                tracing::warn!(
                    operation = error.context().operation(),
                    error = %fallback_error,
                    "Feature reduction fallback failed"
                );
                None
            }
        }
    }
}
