/// Retry strategies with exponential backoff and jitter
///
/// Three schedules share one retry loop:
/// - exponential backoff: delay = min(base * 2^attempt, cap)
/// - exponential backoff with jitter: same, perturbed by ±(jitter_factor * delay)
/// - flat jitter: delay drawn uniformly from [min, max)
///
/// The loop sleeps, re-invokes the operation, and increments the error's retry
/// count after each failed attempt until the budget is spent.
use super::classification::ClassifiedError;
use super::strategy::{Attempt, OperationArgs, RecoveryAlgorithm};
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Delay before retry number `attempt` (zero-based)
pub trait DelaySchedule: Send + Sync + fmt::Debug {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff, optionally jittered
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay of the first retry, in seconds
    base_secs: f64,

    /// Upper bound before jitter, in seconds
    cap_secs: f64,

    /// Relative jitter (0.0 disables it)
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(base_secs: f64, cap_secs: f64) -> Self {
        Self {
            base_secs,
            cap_secs,
            jitter_factor: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Un-jittered delay in seconds
    pub fn base_delay_secs(&self, attempt: u32) -> f64 {
        let exponent = attempt.min(62) as i32;
        (self.base_secs * 2f64.powi(exponent)).min(self.cap_secs)
    }
}

impl DelaySchedule for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_secs(attempt);
        if self.jitter_factor == 0.0 {
            return Duration::from_secs_f64(delay);
        }

        let jitter = delay * self.jitter_factor * rand::thread_rng().gen_range(-1.0..=1.0);
        Duration::from_secs_f64((delay + jitter).max(0.0))
    }
}

/// Flat schedule with a uniformly random delay
#[derive(Debug, Clone)]
pub struct FlatJitter {
    min_secs: f64,
    max_secs: f64,
}

impl FlatJitter {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }
}

impl DelaySchedule for FlatJitter {
    fn delay(&self, _attempt: u32) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs.max(0.0));
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(self.min_secs..self.max_secs))
    }
}

/// Retry loop driven by a delay schedule
#[derive(Debug)]
pub struct RetryAlgorithm {
    name: &'static str,
    schedule: Box<dyn DelaySchedule>,
}

impl RetryAlgorithm {
    /// Exponential backoff without jitter (timeouts)
    pub fn with_backoff(base_secs: f64, cap_secs: f64) -> Self {
        Self {
            name: "retry_with_backoff",
            schedule: Box::new(ExponentialBackoff::new(base_secs, cap_secs)),
        }
    }

    /// Exponential backoff with relative jitter (network errors)
    pub fn with_exponential_backoff(base_secs: f64, cap_secs: f64, jitter_factor: f64) -> Self {
        Self {
            name: "retry_with_exponential_backoff",
            schedule: Box::new(
                ExponentialBackoff::new(base_secs, cap_secs).with_jitter(jitter_factor),
            ),
        }
    }

    /// Flat jittered delay (database errors)
    pub fn with_jitter(min_secs: f64, max_secs: f64) -> Self {
        Self {
            name: "retry_with_jitter",
            schedule: Box::new(FlatJitter::new(min_secs, max_secs)),
        }
    }

    pub fn schedule(&self) -> &dyn DelaySchedule {
        self.schedule.as_ref()
    }
}

#[async_trait]
impl RecoveryAlgorithm for RetryAlgorithm {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn recover(
        &self,
        error: &mut ClassifiedError,
        operation: &dyn Attempt,
        args: OperationArgs,
    ) -> Option<Value> {
        if !error.should_retry() {
            tracing::debug!(
                kind = %error.kind,
                strategy = self.name,
                retry_count = error.retry_count(),
                "Error is not eligible for retry"
            );
            return None;
        }

        while error.should_retry() {
            let attempt = error.retry_count();
            let delay = self.schedule.delay(attempt);

            tracing::info!(
                kind = %error.kind,
                operation = error.context().operation(),
                strategy = self.name,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying after {}",
                humantime::format_duration(delay)
            );
            tokio::time::sleep(delay).await;

            match operation.attempt(args.clone()).await {
                Ok(result) => {
                    tracing::info!(
                        kind = %error.kind,
                        operation = error.context().operation(),
                        attempt = attempt + 1,
                        "Retry succeeded"
                    );
                    return Some(result);
                }
                Err(retry_error) => {
                    tracing::warn!(
                        kind = %error.kind,
                        attempt = attempt + 1,
                        error = %retry_error,
                        "Retry attempt failed"
                    );
                    error.increment_retry();
                }
            }
        }

        tracing::warn!(
            kind = %error.kind,
            operation = error.context().operation(),
            max_retries = error.max_retries(),
            "Retry budget exhausted"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classification::{ErrorClassifier, ErrorContext};
    use crate::error::test_support::FlakyOperation;
    use crate::InsightError;
    use proptest::prelude::*;
    use tokio::time::Instant;

    fn classified(error: InsightError) -> ClassifiedError {
        ErrorClassifier::new().classify(&error, ErrorContext::new("flaky_op"))
    }

    #[test]
    fn test_backoff_sequence_doubles_until_cap() {
        let backoff = ExponentialBackoff::new(1.0, 30.0);
        let delays: Vec<u64> = (0..5).map(|a| backoff.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(backoff.delay(5), Duration::from_secs(30));
        assert_eq!(backoff.delay(40), Duration::from_secs(30));
    }

    #[test]
    fn test_jittered_backoff_stays_within_ten_percent() {
        let backoff = ExponentialBackoff::new(1.0, 60.0).with_jitter(0.1);
        for attempt in 0..8 {
            let nominal = backoff.base_delay_secs(attempt);
            for _ in 0..50 {
                let delay = backoff.delay(attempt).as_secs_f64();
                assert!(delay >= nominal * 0.9 - 1e-9, "{} below {}", delay, nominal);
                assert!(delay <= nominal * 1.1 + 1e-9, "{} above {}", delay, nominal);
            }
        }
        assert_eq!(backoff.base_delay_secs(6), 60.0);
    }

    #[test]
    fn test_flat_jitter_window() {
        let jitter = FlatJitter::new(1.0, 5.0);
        let delays: Vec<f64> = (0..200).map(|a| jitter.delay(a).as_secs_f64()).collect();
        assert!(delays.iter().all(|d| (1.0..5.0).contains(d)));
        assert!(delays.windows(2).any(|w| w[0] != w[1]), "Jitter should vary");
    }

    #[test]
    fn test_flat_jitter_degenerate_window() {
        let jitter = FlatJitter::new(2.0, 2.0);
        assert_eq!(jitter.delay(0), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failures() {
        let operation = FlakyOperation::failing_times(2, || InsightError::Timeout("slow".into()));
        let mut error = classified(InsightError::Timeout("slow".into()));
        let algorithm = RetryAlgorithm::with_backoff(1.0, 30.0);

        let started = Instant::now();
        let result = algorithm
            .recover(&mut error, &operation, OperationArgs::new())
            .await;

        assert_eq!(result, Some(serde_json::json!({"attempt": 3})));
        assert_eq!(operation.calls(), 3);
        assert_eq!(error.retry_count(), 2);
        // Slept 1s + 2s + 4s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_budget() {
        let operation = FlakyOperation::always_failing(|| InsightError::Timeout("down".into()));
        let mut error = classified(InsightError::Timeout("down".into()));
        let algorithm = RetryAlgorithm::with_backoff(1.0, 30.0);

        let result = algorithm
            .recover(&mut error, &operation, OperationArgs::new())
            .await;

        assert!(result.is_none());
        assert_eq!(operation.calls(), 3);
        assert_eq!(error.retry_count(), error.max_retries());
        assert!(!error.should_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retry_error_is_not_retried() {
        let operation = FlakyOperation::always_failing(|| InsightError::OutOfMemory("oom".into()));
        let mut error = classified(InsightError::OutOfMemory("oom".into()));

        let result = RetryAlgorithm::with_backoff(1.0, 30.0)
            .recover(&mut error, &operation, OperationArgs::new())
            .await;

        assert!(result.is_none());
        assert_eq!(operation.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_retry_recovers_database_error() {
        let operation =
            FlakyOperation::failing_times(1, || InsightError::Database("locked".into()));
        let mut error = classified(InsightError::Database("locked".into()));

        let started = Instant::now();
        let result = RetryAlgorithm::with_jitter(1.0, 5.0)
            .recover(&mut error, &operation, OperationArgs::new())
            .await;

        assert!(result.is_some());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_reuses_original_arguments() {
        let operation = FlakyOperation::failing_times(1, || InsightError::Network("reset".into()));
        let mut error = classified(InsightError::Network("reset".into()));
        let args = OperationArgs::new().with_features(vec!["strings".to_string()]);

        RetryAlgorithm::with_exponential_backoff(1.0, 60.0, 0.1)
            .recover(&mut error, &operation, args.clone())
            .await;

        assert_eq!(operation.last_args(), Some(args));
    }

    proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(
            base in 0.01f64..5.0,
            cap in 1.0f64..120.0,
            attempt in 0u32..20,
        ) {
            let backoff = ExponentialBackoff::new(base, cap);
            let current = backoff.base_delay_secs(attempt);
            let next = backoff.base_delay_secs(attempt + 1);
            prop_assert!(current <= cap);
            prop_assert!(next >= current);
        }
    }
}
