//! Per-turn cost tracking

use crate::catalog;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};

pub const COST_LOG_CAPACITY: usize = 10_000;
const RECENT_COUNT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct CostRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub trace_id: String,
    pub operation: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ModelCost {
    pub count: usize,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentCost {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub cost_usd: f64,
    pub operation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_requests: usize,
    pub by_model: BTreeMap<String, ModelCost>,
    pub recent: Vec<RecentCost>,
}

/// Bounded, append-only cost log
pub struct CostTracker {
    records: Mutex<VecDeque<CostRecord>>,
    capacity: usize,
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

impl CostTracker {
    pub fn new() -> Self {
        Self::with_capacity(COST_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Price the usage, append a record and return the cost
    pub fn record(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        trace_id: &str,
        operation: &str,
    ) -> f64 {
        let cost_usd = catalog::cost_usd(model, input_tokens, output_tokens);

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(CostRecord {
            timestamp: Utc::now(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost_usd,
            trace_id: trace_id.to_string(),
            operation: operation.to_string(),
        });

        cost_usd
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> CostSummary {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);

        let mut by_model: BTreeMap<String, ModelCost> = BTreeMap::new();
        for r in records.iter() {
            let entry = by_model.entry(r.model.clone()).or_default();
            entry.count += 1;
            entry.cost_usd += r.cost_usd;
            entry.input_tokens += r.input_tokens;
            entry.output_tokens += r.output_tokens;
        }

        let recent = records
            .iter()
            .skip(records.len().saturating_sub(RECENT_COUNT))
            .map(|r| RecentCost {
                timestamp: r.timestamp,
                model: r.model.clone(),
                cost_usd: round6(r.cost_usd),
                operation: r.operation.clone(),
            })
            .collect();

        CostSummary {
            total_cost_usd: round6(records.iter().map(|r| r.cost_usd).sum()),
            total_input_tokens: records.iter().map(|r| r.input_tokens).sum(),
            total_output_tokens: records.iter().map(|r| r.output_tokens).sum(),
            total_requests: records.len(),
            by_model,
            recent,
        }
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_summary() {
        let tracker = CostTracker::new();
        let cost = tracker.record("gpt-4o-mini", 1000, 500, "t1", "finance_query");
        assert!((cost - (1000.0 * 0.15 + 500.0 * 0.60) / 1_000_000.0).abs() < 1e-12);
        tracker.record("unknown", 10, 10, "t2", "finance_query");

        let summary = tracker.summary();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.total_input_tokens, 1010);
        assert_eq!(summary.by_model["unknown"].cost_usd, 0.0);
        assert_eq!(summary.by_model["gpt-4o-mini"].count, 1);
        assert_eq!(summary.recent.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let tracker = CostTracker::with_capacity(3);
        for i in 0..5 {
            tracker.record("gpt-4o", 1, 1, &format!("t{}", i), "op");
        }
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_recent_is_capped() {
        let tracker = CostTracker::new();
        for i in 0..30 {
            tracker.record("gpt-4o", 1, 1, &format!("t{}", i), "op");
        }
        assert_eq!(tracker.summary().recent.len(), RECENT_COUNT);
    }
}
