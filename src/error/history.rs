/// Bounded recovery history and error statistics
///
/// The history is a FIFO ring of `ClassifiedError`s. Entries are appended as
/// `Pending` when a failure is classified and updated in place once recovery
/// settles. It feeds statistics only and never influences recovery decisions.
use super::classification::{ClassifiedError, RecoveryOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Successful vs failed recoveries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub successful: usize,
    pub failed: usize,
}

/// Aggregate view over the recovery history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub total_errors: usize,
    pub error_types: BTreeMap<String, usize>,
    pub severities: BTreeMap<String, usize>,
    pub recovery_stats: RecoveryStats,
    pub most_common_error: Option<String>,
}

#[derive(Debug)]
pub struct RecoveryHistory {
    capacity: usize,
    entries: Mutex<VecDeque<ClassifiedError>>,
}

impl RecoveryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_SIZE))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ClassifiedError>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry, evicting the oldest once the bound is reached
    pub fn push(&self, error: ClassifiedError) {
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(error);
    }

    /// Replace the entry with the same id. Returns false if it was evicted.
    pub fn settle(&self, error: &ClassifiedError) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().find(|entry| entry.id == error.id) {
            Some(entry) => {
                *entry = error.clone();
                true
            }
            None => false,
        }
    }

    /// Set the outcome of the entry with the given id
    pub fn set_outcome(&self, id: Uuid, outcome: RecoveryOutcome) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.outcome = outcome;
                true
            }
            None => false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the entries, oldest first
    pub fn snapshot(&self) -> Vec<ClassifiedError> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn statistics(&self) -> ErrorStatistics {
        let entries = self.lock();
        let mut stats = ErrorStatistics {
            total_errors: entries.len(),
            ..Default::default()
        };

        // Kinds in first-seen order so ties resolve to the earliest kind
        let mut first_seen: Vec<&str> = Vec::new();
        for error in entries.iter() {
            let count = stats.error_types.entry(error.kind.clone()).or_insert(0);
            if *count == 0 {
                first_seen.push(&error.kind);
            }
            *count += 1;

            *stats
                .severities
                .entry(error.severity.as_str().to_string())
                .or_insert(0) += 1;

            match error.outcome {
                RecoveryOutcome::Recovered => stats.recovery_stats.successful += 1,
                RecoveryOutcome::Failed => stats.recovery_stats.failed += 1,
                RecoveryOutcome::Pending => {}
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for kind in first_seen {
            let count = stats.error_types.get(kind).copied().unwrap_or(0);
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((kind, count));
            }
        }
        stats.most_common_error = best.map(|(kind, _)| kind.to_string());

        stats
    }
}

impl Default for RecoveryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
