// Scripted operations for recovery tests

use super::strategy::{Attempt, OperationArgs};
use crate::{InsightError, InsightResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Fails a fixed number of times, then returns `{"attempt": n}`
pub(crate) struct FlakyOperation {
    failures: Option<u32>,
    make_error: Box<dyn Fn() -> InsightError + Send + Sync>,
    calls: AtomicU32,
    last_args: Mutex<Option<OperationArgs>>,
}

impl FlakyOperation {
    pub(crate) fn failing_times(
        failures: u32,
        make_error: impl Fn() -> InsightError + Send + Sync + 'static,
    ) -> Self {
        Self {
            failures: Some(failures),
            make_error: Box::new(make_error),
            calls: AtomicU32::new(0),
            last_args: Mutex::new(None),
        }
    }

    pub(crate) fn always_failing(
        make_error: impl Fn() -> InsightError + Send + Sync + 'static,
    ) -> Self {
        Self {
            failures: None,
            ..Self::failing_times(0, make_error)
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_args(&self) -> Option<OperationArgs> {
        self.last_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl Attempt for FlakyOperation {
    async fn attempt(&self, args: OperationArgs) -> InsightResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_args.lock().unwrap() = Some(args);

        match self.failures {
            Some(failures) if call > failures => Ok(json!({ "attempt": call })),
            _ => Err((self.make_error)()),
        }
    }
}
