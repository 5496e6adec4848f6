//! Preference extraction
//!
//! Heuristic scan of a finished turn for durable user preferences.

use crate::memory::store::MemoryStore;
use lazy_static::lazy_static;
use regex::Regex;

pub const PREFERRED_TIME_RANGE: &str = "preferred_time_range";
pub const RISK_TOLERANCE: &str = "risk_tolerance";

/// Tool whose use makes a mentioned time range worth remembering
const PERFORMANCE_TOOL: &str = "portfolio_performance";

lazy_static! {
    static ref TIME_RANGE_RE: Regex =
        Regex::new(r"\b(1d|1w|1m|3m|6m|ytd|1y|3y|5y)\b").unwrap();
    static ref RISK_RE: Regex =
        Regex::new(r"\b(conservative|moderate|aggressive)\b").unwrap();
}

impl MemoryStore {
    /// Store a time range (only when a performance lookup ran) and a risk
    /// tolerance mentioned in the query. The two checks are independent.
    pub fn extract_preferences(&self, user: &str, query: &str, tools_called: &[String]) {
        let lowered = query.to_lowercase();

        if tools_called.iter().any(|t| t == PERFORMANCE_TOOL) {
            if let Some(m) = TIME_RANGE_RE.captures(&lowered).and_then(|c| c.get(1)) {
                self.set_preference(user, PREFERRED_TIME_RANGE, m.as_str());
            }
        }

        if let Some(m) = RISK_RE.captures(&lowered).and_then(|c| c.get(1)) {
            self.set_preference(user, RISK_TOLERANCE, m.as_str());
        }
    }
}
