use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::TriggerResult;

#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    pub captured_at: DateTime<Utc>,
    pub image_bytes: usize,
    pub response: TriggerResult,
    pub fired: Option<String>,
}

/// Most recent captures first, never more than `limit`.
#[derive(Debug)]
pub struct CaptureHistory {
    limit: usize,
    records: Mutex<VecDeque<CaptureRecord>>,
}

impl CaptureHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            records: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn record(&self, record: CaptureRecord) {
        if self.limit == 0 {
            return;
        }
        let mut records = self.records.lock();
        records.push_front(record);
        records.truncate(self.limit);
    }

    pub fn snapshot(&self) -> Vec<CaptureRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str) -> CaptureRecord {
        CaptureRecord {
            captured_at: Utc::now(),
            image_bytes: 10,
            response: TriggerResult::from_entries([(key, false)]),
            fired: None,
        }
    }

    #[test]
    fn keeps_newest_window() {
        let history = CaptureHistory::new(2);
        for key in ["a", "b", "c"] {
            history.record(record(key));
        }
        let keys: Vec<_> = history
            .snapshot()
            .iter()
            .map(|r| r.response.entries()[0].0.clone())
            .collect();
        assert_eq!(keys, ["c", "b"]);

        history.clear();
        assert!(history.snapshot().is_empty());
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let history = CaptureHistory::new(0);
        history.record(record("a"));
        assert!(history.snapshot().is_empty());
    }
}
