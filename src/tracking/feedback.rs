//! Thumbs up/down feedback log

use crate::models::Rating;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

pub const FEEDBACK_LOG_CAPACITY: usize = 10_000;
const RECENT_COUNT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub rating: Rating,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSummary {
    pub total: usize,
    pub thumbs_up: usize,
    pub thumbs_down: usize,
    pub recent: Vec<FeedbackRecord>,
}

pub struct FeedbackStore {
    records: Mutex<VecDeque<FeedbackRecord>>,
    capacity: usize,
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self::with_capacity(FEEDBACK_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, trace_id: &str, rating: Rating) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(FeedbackRecord {
            timestamp: Utc::now(),
            trace_id: trace_id.to_string(),
            rating,
        });
    }

    pub fn summary(&self) -> FeedbackSummary {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let thumbs_up = records.iter().filter(|r| r.rating == Rating::Up).count();

        FeedbackSummary {
            total: records.len(),
            thumbs_up,
            thumbs_down: records.len() - thumbs_up,
            recent: records
                .iter()
                .skip(records.len().saturating_sub(RECENT_COUNT))
                .cloned()
                .collect(),
        }
    }
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let store = FeedbackStore::new();
        store.record("a", Rating::Up);
        store.record("b", Rating::Down);
        store.record("c", Rating::Up);

        let summary = store.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.thumbs_up, 2);
        assert_eq!(summary.thumbs_down, 1);
        assert_eq!(summary.recent.last().map(|r| r.trace_id.as_str()), Some("c"));
    }

    #[test]
    fn test_bounded() {
        let store = FeedbackStore::with_capacity(2);
        store.record("a", Rating::Up);
        store.record("b", Rating::Up);
        store.record("c", Rating::Down);

        let summary = store.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.recent[0].trace_id, "b");
    }
}
