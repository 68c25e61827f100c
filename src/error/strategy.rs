/// Recovery strategy set - maps a classified error to a recovery algorithm
///
/// Lookup is keyed by the error's strategy name. Within a strategy, an
/// algorithm may be registered for specific kinds (matched like the
/// classifier: the first registered key contained in the kind name wins),
/// otherwise the strategy's default algorithm is used. A strategy with no
/// registration means recovery is abandoned.
use super::classification::{ClassifiedError, RecoveryStrategy};
use super::mechanisms::{FeatureReductionFallback, SimplerAnalysisFallback};
use super::retry::RetryAlgorithm;
use crate::config::RecoveryConfig;
use crate::InsightResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Key under which the feature list travels in `OperationArgs`
pub const FEATURES_KEY: &str = "features";

/// Arguments handed to a recoverable operation. Fallback strategies rewrite
/// the feature list before re-invoking the operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationArgs {
    features: Option<Vec<String>>,
    params: BTreeMap<String, Value>,
}

impl OperationArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn features(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    pub fn set_features(&mut self, features: Vec<String>) {
        self.features = Some(features);
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Number of supplied arguments, counting the feature list as one
    pub fn len(&self) -> usize {
        self.params.len() + usize::from(self.features.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Argument names, feature list first
    pub fn keys(&self) -> Vec<String> {
        self.features
            .iter()
            .map(|_| FEATURES_KEY.to_string())
            .chain(self.params.keys().cloned())
            .collect()
    }
}

/// One invocation of a recoverable operation
#[async_trait]
pub trait Attempt: Send + Sync {
    async fn attempt(&self, args: OperationArgs) -> InsightResult<Value>;
}

/// Presents a borrowed async closure as an `Attempt`
pub struct OperationFn<'o, F> {
    inner: &'o F,
}

impl<'o, F> OperationFn<'o, F> {
    pub fn new(inner: &'o F) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<'o, F, Fut> Attempt for OperationFn<'o, F>
where
    F: Fn(OperationArgs) -> Fut + Send + Sync,
    Fut: Future<Output = InsightResult<Value>> + Send + 'o,
{
    async fn attempt(&self, args: OperationArgs) -> InsightResult<Value> {
        (self.inner)(args).await
    }
}

/// An executable recovery algorithm.
///
/// Returns `Some` with a replacement result, or `None` when it could not
/// recover. Algorithms never raise; failures of re-invoked operations are
/// logged and absorbed.
#[async_trait]
pub trait RecoveryAlgorithm: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn recover(
        &self,
        error: &mut ClassifiedError,
        operation: &dyn Attempt,
        args: OperationArgs,
    ) -> Option<Value>;
}

#[derive(Clone, Default)]
struct StrategyEntry {
    default: Option<Arc<dyn RecoveryAlgorithm>>,
    by_kind: Vec<(String, Arc<dyn RecoveryAlgorithm>)>,
}

/// Registry of recovery algorithms keyed by strategy
#[derive(Clone, Default)]
pub struct StrategySet {
    entries: HashMap<RecoveryStrategy, StrategyEntry>,
}

impl StrategySet {
    /// Set with nothing registered; every lookup abandons recovery
    pub fn empty() -> Self {
        Self::default()
    }

    /// Default registrations:
    /// - retry: exponential backoff; jittered exponential backoff for network
    ///   and connection kinds; flat jitter for database kinds
    /// - fallback: feature reduction; simpler analysis for analysis kinds
    pub fn from_config(config: &RecoveryConfig) -> Self {
        let mut set = Self::empty();

        set.register(
            RecoveryStrategy::Retry,
            Arc::new(RetryAlgorithm::with_backoff(
                config.backoff_base_secs,
                config.backoff_cap_secs,
            )),
        );

        let jittered: Arc<dyn RecoveryAlgorithm> =
            Arc::new(RetryAlgorithm::with_exponential_backoff(
                config.backoff_base_secs,
                config.jittered_backoff_cap_secs,
                config.jitter_factor,
            ));
        set.register_for_kind(RecoveryStrategy::Retry, "network", Arc::clone(&jittered));
        set.register_for_kind(RecoveryStrategy::Retry, "connection", jittered);

        set.register_for_kind(
            RecoveryStrategy::Retry,
            "database",
            Arc::new(RetryAlgorithm::with_jitter(
                config.flat_jitter_min_secs,
                config.flat_jitter_max_secs,
            )),
        );

        set.register(
            RecoveryStrategy::Fallback,
            Arc::new(FeatureReductionFallback::new()),
        );
        set.register_for_kind(
            RecoveryStrategy::Fallback,
            "analysis",
            Arc::new(SimplerAnalysisFallback::new(config.fallback_features.clone())),
        );

        set
    }

    /// Register the default algorithm for a strategy
    pub fn register(&mut self, strategy: RecoveryStrategy, algorithm: Arc<dyn RecoveryAlgorithm>) {
        self.entries.entry(strategy).or_default().default = Some(algorithm);
    }

    /// Register an algorithm for kinds whose name contains `kind`
    pub fn register_for_kind(
        &mut self,
        strategy: RecoveryStrategy,
        kind: impl Into<String>,
        algorithm: Arc<dyn RecoveryAlgorithm>,
    ) {
        let kind = kind.into().to_lowercase();
        let entry = self.entries.entry(strategy).or_default();
        match entry.by_kind.iter_mut().find(|(key, _)| *key == kind) {
            Some(slot) => slot.1 = algorithm,
            None => entry.by_kind.push((kind, algorithm)),
        }
    }

    /// Drop every registration for a strategy
    pub fn remove(&mut self, strategy: RecoveryStrategy) -> bool {
        self.entries.remove(&strategy).is_some()
    }

    pub fn contains(&self, strategy: RecoveryStrategy) -> bool {
        self.entries.contains_key(&strategy)
    }

    /// Algorithm for an error's strategy and kind, if any
    pub fn resolve(
        &self,
        strategy: RecoveryStrategy,
        kind: &str,
    ) -> Option<Arc<dyn RecoveryAlgorithm>> {
        let entry = self.entries.get(&strategy)?;
        entry
            .by_kind
            .iter()
            .find(|(key, _)| kind.contains(key.as_str()))
            .map(|(_, algorithm)| Arc::clone(algorithm))
            .or_else(|| entry.default.clone())
    }
}

impl fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (strategy, entry) in &self.entries {
            let default = entry.default.as_ref().map(|a| a.name());
            let kinds: Vec<(&str, &str)> = entry
                .by_kind
                .iter()
                .map(|(kind, algorithm)| (kind.as_str(), algorithm.name()))
                .collect();
            map.entry(strategy, &(default, kinds));
        }
        map.finish()
    }
}
