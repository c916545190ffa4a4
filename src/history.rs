/// Bounded per-location assessment history.
///
/// Every location gets its own ring of at most `cap` assessments, oldest
/// evicted first. Each ring sits behind its own `RwLock` so appends for
/// different locations never contend, and eviction happens under the same
/// write guard as the append: a reader can never see more than `cap`
/// entries or a half-written one.
///
/// Unknown location ids read as empty history. Whether an id is registered
/// is the registry's business, not this store's.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::model::Assessment;

/// Default number of assessments retained per location.
pub const DEFAULT_RETENTION_CAP: usize = 1000;

type Log = Arc<RwLock<VecDeque<Assessment>>>;

pub struct HistoryStore {
    cap: usize,
    logs: RwLock<HashMap<String, Log>>,
}

impl HistoryStore {
    /// A cap of zero is treated as one.
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            logs: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    fn log_for(&self, location_id: &str) -> Option<Log> {
        self.logs.read().get(location_id).cloned()
    }

    fn log_for_write(&self, location_id: &str) -> Log {
        if let Some(log) = self.log_for(location_id) {
            return log;
        }
        self.logs
            .write()
            .entry(location_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(VecDeque::with_capacity(self.cap.min(64)))))
            .clone()
    }

    /// Appends one assessment, evicting the oldest if the cap is exceeded.
    /// Returns the number of evicted entries.
    pub fn append(&self, location_id: &str, assessment: Assessment) -> usize {
        self.extend(location_id, std::iter::once(assessment))
    }

    /// Appends a batch in order. The cap holds after every element, so a
    /// batch larger than the cap leaves only its newest `cap` entries.
    pub fn extend(
        &self,
        location_id: &str,
        assessments: impl IntoIterator<Item = Assessment>,
    ) -> usize {
        let log = self.log_for_write(location_id);
        let mut entries = log.write();
        let mut evicted = 0;
        for assessment in assessments {
            entries.push_back(assessment);
            while entries.len() > self.cap {
                entries.pop_front();
                evicted += 1;
            }
        }
        evicted
    }

    /// Up to `limit` assessments, most recent first.
    pub fn recent(&self, location_id: &str, limit: usize) -> Vec<Assessment> {
        match self.log_for(location_id) {
            Some(log) => log.read().iter().rev().take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn latest(&self, location_id: &str) -> Option<Assessment> {
        self.log_for(location_id)
            .and_then(|log| log.read().back().cloned())
    }

    /// Assessments made at or after `since`, most recent first.
    pub fn since(&self, location_id: &str, since: DateTime<Utc>) -> Vec<Assessment> {
        match self.log_for(location_id) {
            Some(log) => log
                .read()
                .iter()
                .rev()
                .take_while(|a| a.assessed_at >= since)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self, location_id: &str) -> usize {
        self.log_for(location_id).map(|log| log.read().len()).unwrap_or(0)
    }

    pub fn is_empty(&self, location_id: &str) -> bool {
        self.len(location_id) == 0
    }

    /// Drops a location's history entirely. Returns how many entries went.
    pub fn remove(&self, location_id: &str) -> usize {
        self.logs
            .write()
            .remove(location_id)
            .map(|log| log.read().len())
            .unwrap_or(0)
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_CAP)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
