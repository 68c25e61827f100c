/// Scripted analysis engine

use ghidrainsight_core::{AnalysisEngine, InsightError, InsightResult};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Engine returning `{"feature": name, "size": n}` unless a failure is
/// scripted for the feature
#[derive(Default)]
pub struct ScriptedEngine {
    failures: HashMap<String, String>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, feature: &str, message: &str) -> Self {
        self.failures.insert(feature.to_string(), message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AnalysisEngine for ScriptedEngine {
    fn run_feature(&self, feature: &str, data: &[u8]) -> InsightResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.get(feature) {
            Some(message) => Err(InsightError::Analysis(message.clone())),
            None => Ok(json!({ "feature": feature, "size": data.len() })),
        }
    }
}
