/// Error classification system for recovery strategy selection
///
/// Every failed operation is turned into a `ClassifiedError` carrying its kind,
/// severity, recoverability and the recovery strategy to apply. Classification
/// walks an ordered rule list over the failure's kind name; the first rule whose
/// needle appears in the name wins, and unmatched failures escalate.
use super::strategy::OperationArgs;
use crate::InsightError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::fmt;
use uuid::Uuid;

/// Structured failure kind supplied by the failing operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Timeout,
    Memory,
    Network,
    Connection,
    Database,
    Analysis,
    Io,
    Config,
    Serialization,

    /// Caller-defined kind, matched by name like the built-in ones
    Custom(String),
}

impl FailureKind {
    /// Lower-cased name the classification rules are matched against
    pub fn name(&self) -> String {
        match self {
            FailureKind::Timeout => "timeout".to_string(),
            FailureKind::Memory => "memory".to_string(),
            FailureKind::Network => "network".to_string(),
            FailureKind::Connection => "connection".to_string(),
            FailureKind::Database => "database".to_string(),
            FailureKind::Analysis => "analysis".to_string(),
            FailureKind::Io => "io".to_string(),
            FailureKind::Config => "config".to_string(),
            FailureKind::Serialization => "serialization".to_string(),
            FailureKind::Custom(name) => name.to_lowercase(),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How bad a failure is; drives the log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recovery disposition chosen for a classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStrategy {
    /// Re-run the operation on a delay schedule
    Retry,

    /// Re-run the operation once with degraded arguments
    Fallback,

    /// Give up on this unit of work
    Skip,

    /// Hand the failure back to the caller
    Escalate,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::Fallback => "fallback",
            RecoveryStrategy::Skip => "skip",
            RecoveryStrategy::Escalate => "escalate",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of a recovery attempt, recorded in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryOutcome {
    Pending,
    Recovered,
    Failed,
}

/// Where the failure happened. Immutable once captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    operation: String,
    arg_count: usize,
    arg_keys: Vec<String>,
    backtrace: String,
}

impl ErrorContext {
    /// Capture the context of a failed invocation, including a backtrace
    /// (populated when `RUST_BACKTRACE` is set).
    pub fn capture(operation: impl Into<String>, args: &OperationArgs) -> Self {
        Self {
            operation: operation.into(),
            arg_count: args.len(),
            arg_keys: args.keys(),
            backtrace: Backtrace::capture().to_string(),
        }
    }

    /// Context without arguments or backtrace
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            arg_count: 0,
            arg_keys: Vec::new(),
            backtrace: String::new(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    pub fn arg_keys(&self) -> &[String] {
        &self.arg_keys
    }

    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }
}

/// Classified error with recovery information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Identifies the history entry for this failure
    pub id: Uuid,

    /// Lower-cased kind name (e.g. "timeout", "database")
    pub kind: String,

    /// Display text of the underlying failure
    pub message: String,

    pub severity: Severity,

    /// False only for failures no rule matched
    pub recoverable: bool,

    pub strategy: RecoveryStrategy,

    context: ErrorContext,

    pub timestamp: DateTime<Utc>,

    retry_count: u32,

    max_retries: u32,

    pub outcome: RecoveryOutcome,
}

impl ClassifiedError {
    /// True while another retry is allowed for a retry-strategy failure
    pub fn should_retry(&self) -> bool {
        self.recoverable
            && self.strategy == RecoveryStrategy::Retry
            && self.retry_count < self.max_retries
    }

    /// Record a failed retry attempt. Never exceeds `max_retries`.
    pub fn increment_retry(&mut self) {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get remaining retry attempts
    pub fn remaining_retries(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error in {}: {} (severity {}, strategy {}, retry {}/{})",
            self.kind,
            self.context.operation,
            self.message,
            self.severity,
            self.strategy,
            self.retry_count,
            self.max_retries
        )
    }
}

/// One entry of the ordered classification table
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    needles: Vec<String>,
    pub severity: Severity,
    pub recoverable: bool,
    pub strategy: RecoveryStrategy,
}

impl ClassificationRule {
    /// Rule matching any kind name that contains one of `needles`
    pub fn new(
        needles: &[&str],
        severity: Severity,
        recoverable: bool,
        strategy: RecoveryStrategy,
    ) -> Self {
        Self {
            needles: needles.iter().map(|n| n.to_lowercase()).collect(),
            severity,
            recoverable,
            strategy,
        }
    }

    pub fn matches(&self, kind_name: &str) -> bool {
        self.needles.iter().any(|needle| kind_name.contains(needle.as_str()))
    }
}

/// Built-in rules, highest priority first
fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(&["timeout"], Severity::High, true, RecoveryStrategy::Retry),
        ClassificationRule::new(
            &["memory"],
            Severity::Critical,
            true,
            RecoveryStrategy::Fallback,
        ),
        ClassificationRule::new(
            &["network", "connection"],
            Severity::Medium,
            true,
            RecoveryStrategy::Retry,
        ),
        ClassificationRule::new(&["database"], Severity::High, true, RecoveryStrategy::Retry),
    ]
}

/// Error classifier - determines severity, recoverability and strategy
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
    max_retries: u32,
}

impl ErrorClassifier {
    /// Classifier with the built-in rules and the default retry budget of 3
    pub fn new() -> Self {
        Self::with_max_retries(3)
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            rules: default_rules(),
            max_retries,
        }
    }

    /// Append a rule. Caller rules rank below the built-in ones and above the
    /// unclassified catch-all.
    pub fn push_rule(&mut self, rule: ClassificationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Severity, recoverability and strategy for a kind name. First match wins.
    pub fn disposition(&self, kind_name: &str) -> (Severity, bool, RecoveryStrategy) {
        let kind_name = kind_name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&kind_name))
            .map(|rule| (rule.severity, rule.recoverable, rule.strategy))
            .unwrap_or((Severity::Medium, false, RecoveryStrategy::Escalate))
    }

    /// Classify a failure raised by the operation described in `context`
    pub fn classify(&self, error: &InsightError, context: ErrorContext) -> ClassifiedError {
        let kind = error.failure_kind().name();
        let (severity, recoverable, strategy) = self.disposition(&kind);

        ClassifiedError {
            id: Uuid::new_v4(),
            kind,
            message: error.to_string(),
            severity,
            recoverable,
            strategy,
            context,
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries: self.max_retries,
            outcome: RecoveryOutcome::Pending,
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
