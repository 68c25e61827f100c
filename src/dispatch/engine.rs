// Analysis engine seam
//
// The dispatcher only ever calls `run_feature`. The basic engine covers the
// minimal feature set used by the simpler-analysis fallback.

use crate::{InsightError, InsightResult};
use serde_json::{json, Value};

/// Runs one named analysis feature over a byte buffer
#[cfg_attr(test, mockall::automock)]
pub trait AnalysisEngine: Send + Sync {
    fn run_feature(&self, feature: &str, data: &[u8]) -> InsightResult<Value>;
}

/// Minimum printable run reported by the `strings` feature
const MIN_STRING_LEN: usize = 4;

/// Cap on strings returned per call
const MAX_STRINGS: usize = 1000;

/// Built-in engine supporting `basic_info` and `strings`
#[derive(Debug, Clone, Default)]
pub struct BasicEngine;

impl BasicEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn supported_features() -> &'static [&'static str] {
        &["basic_info", "strings"]
    }

    fn basic_info(data: &[u8]) -> Value {
        let mut seen = [false; 256];
        let mut zeros = 0usize;
        for &byte in data {
            seen[byte as usize] = true;
            if byte == 0 {
                zeros += 1;
            }
        }

        let zero_ratio = if data.is_empty() {
            0.0
        } else {
            zeros as f64 / data.len() as f64
        };

        json!({
            "size": data.len(),
            "distinct_bytes": seen.iter().filter(|s| **s).count(),
            "zero_ratio": zero_ratio,
        })
    }

    fn strings(data: &[u8]) -> Value {
        let mut found = Vec::new();
        let mut total = 0usize;
        let mut start = None;

        // Sentinel byte flushes a run that reaches the end of the buffer
        for (index, byte) in data.iter().copied().chain(std::iter::once(0u8)).enumerate() {
            let printable = byte == b' ' || byte.is_ascii_graphic();
            match (printable, start) {
                (true, None) => start = Some(index),
                (false, Some(begin)) => {
                    if index - begin >= MIN_STRING_LEN {
                        total += 1;
                        if found.len() < MAX_STRINGS {
                            found.push(json!({
                                "offset": begin,
                                "value": String::from_utf8_lossy(&data[begin..index]),
                            }));
                        }
                    }
                    start = None;
                }
                _ => {}
            }
        }

        json!({
            "count": total,
            "truncated": total > found.len(),
            "strings": found,
        })
    }
}

impl AnalysisEngine for BasicEngine {
    fn run_feature(&self, feature: &str, data: &[u8]) -> InsightResult<Value> {
        match feature {
            "basic_info" => Ok(Self::basic_info(data)),
            "strings" => Ok(Self::strings(data)),
            other => Err(InsightError::Analysis(format!(
                "unsupported feature '{}'",
                other
            ))),
        }
    }
}
