// Allow complex types where needed for boxed operation futures and strategy tables
#![allow(clippy::type_complexity)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod region;

// Re-export the main entry points for convenience
pub use config::{DispatchConfig, InsightConfig, LoggingConfig, RecoveryConfig, RegionConfig};
pub use dispatch::{AnalysisEngine, BasicEngine, TaskDispatcher};
pub use error::{ClassifiedError, FailureKind, OperationArgs, RecoveryManager};
pub use orchestrator::AnalysisOrchestrator;
pub use region::{RegionManager, RegionStatus};

use thiserror::Error;

// Crate-wide error type. Variants mirror the failure families the
// classifier understands; see `InsightError::failure_kind`.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind}: {message}")]
    Custom { kind: String, message: String },
}

impl InsightError {
    /// Build a caller-defined failure with an explicit kind name.
    pub fn custom(kind: impl Into<String>, message: impl Into<String>) -> Self {
        InsightError::Custom {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Structured failure kind used by the classifier
    pub fn failure_kind(&self) -> FailureKind {
        use std::io::ErrorKind;

        match self {
            InsightError::Timeout(_) => FailureKind::Timeout,
            InsightError::OutOfMemory(_) => FailureKind::Memory,
            InsightError::Network(_) => FailureKind::Network,
            InsightError::Connection(_) => FailureKind::Connection,
            InsightError::Database(_) => FailureKind::Database,
            InsightError::Analysis(_) => FailureKind::Analysis,
            InsightError::Config(_) => FailureKind::Config,
            InsightError::Io(io_err) => match io_err.kind() {
                ErrorKind::TimedOut => FailureKind::Timeout,
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected => FailureKind::Connection,
                ErrorKind::OutOfMemory => FailureKind::Memory,
                _ => FailureKind::Io,
            },
            InsightError::Serialization(_) => FailureKind::Serialization,
            InsightError::Custom { kind, .. } => FailureKind::Custom(kind.clone()),
        }
    }
}

// Any reqwest failure, including the per-call timeout, is a network-kind
// failure from the orchestration layer's point of view.
impl From<reqwest::Error> for InsightError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InsightError::Network(format!("request timed out: {}", err))
        } else {
            InsightError::Network(err.to_string())
        }
    }
}

impl From<::config::ConfigError> for InsightError {
    fn from(err: ::config::ConfigError) -> Self {
        InsightError::Config(err.to_string())
    }
}

pub type InsightResult<T> = Result<T, InsightError>;
