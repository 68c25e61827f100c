/// Simpler analysis - swap the requested features for a minimal set
use super::FallbackResult;
use crate::error::classification::ClassifiedError;
use crate::error::strategy::{Attempt, OperationArgs, RecoveryAlgorithm};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct SimplerAnalysisFallback {
    features: Vec<String>,
}

impl SimplerAnalysisFallback {
    pub fn new(features: Vec<String>) -> Self {
        Self { features }
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }
}

impl Default for SimplerAnalysisFallback {
    fn default() -> Self {
        Self::new(vec!["basic_info".to_string(), "strings".to_string()])
    }
}

#[async_trait]
impl RecoveryAlgorithm for SimplerAnalysisFallback {
    fn name(&self) -> &'static str {
        "simpler_analysis"
    }

    async fn recover(
        &self,
        error: &mut ClassifiedError,
        operation: &dyn Attempt,
        mut args: OperationArgs,
    ) -> Option<Value> {
        tracing::info!(
            operation = error.context().operation(),
            features = ?self.features,
            "Falling back to simpler analysis"
        );
        args.set_features(self.features.clone());

        match operation.attempt(args).await {
            Ok(result) => {
                Some(FallbackResult::simplified(result, self.features.clone()).into_value())
            }
            Err(fallback_error) => {
                tracing::warn!(
                    operation = error.context().operation(),
                    error = %fallback_error,
                    "Simpler analysis fallback failed"
                );
                None
            }
        }
    }
}
