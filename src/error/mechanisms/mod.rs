/// Fallback mechanisms - degrade the request and try once more
///
/// Fallbacks are used when repeating the same call cannot help (memory
/// exhaustion, a failing analysis pass). Each rewrites the feature list, re-runs
/// the operation once, and tags a successful result with what was degraded.
pub mod feature_reduction;
pub mod simpler_analysis;

pub use feature_reduction::FeatureReductionFallback;
pub use simpler_analysis::SimplerAnalysisFallback;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope around a result produced under degraded arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResult {
    pub fallback_applied: bool,

    /// Why the fallback was taken ("memory_error", "analysis_error")
    pub reason: String,

    /// Feature list after halving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_features: Option<Vec<String>>,

    /// Minimal feature list substituted for the original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_features: Option<Vec<String>>,

    pub result: Value,
}

impl FallbackResult {
    pub fn reduced(result: Value, features: Vec<String>) -> Self {
        Self {
            fallback_applied: true,
            reason: "memory_error".to_string(),
            reduced_features: Some(features),
            simple_features: None,
            result,
        }
    }

    pub fn simplified(result: Value, features: Vec<String>) -> Self {
        Self {
            fallback_applied: true,
            reason: "analysis_error".to_string(),
            reduced_features: None,
            simple_features: Some(features),
            result,
        }
    }

    pub fn into_value(self) -> Value {
        let mut envelope = json!({
            "fallback_applied": self.fallback_applied,
            "reason": self.reason,
            "result": self.result,
        });
        if let Some(features) = self.reduced_features {
            envelope["reduced_features"] = json!(features);
        }
        if let Some(features) = self.simple_features {
            envelope["simple_features"] = json!(features);
        }
        envelope
    }

    /// Parse a value produced by `into_value`; `None` for plain results
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("fallback_applied").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let value = FallbackResult::reduced(json!({"ok": 1}), vec!["a".into()]).into_value();
        assert_eq!(value["fallback_applied"], json!(true));
        assert_eq!(value["reason"], json!("memory_error"));
        assert_eq!(value["reduced_features"], json!(["a"]));
        assert!(value.get("simple_features").is_none());
        assert_eq!(value["result"], json!({"ok": 1}));
    }

    #[test]
    fn test_from_value_ignores_plain_results() {
        assert!(FallbackResult::from_value(&json!({"result": 1})).is_none());

        let value = FallbackResult::simplified(json!(null), vec!["strings".into()]).into_value();
        let parsed = FallbackResult::from_value(&value).unwrap();
        assert_eq!(parsed.reason, "analysis_error");
        assert_eq!(parsed.simple_features, Some(vec!["strings".to_string()]));
    }
}
