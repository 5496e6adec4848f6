//! Numerical consistency
//!
//! Every dollar amount and percentage quoted in the answer must appear in
//! the raw tool data, either literally or as its bare numeric value.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref DOLLAR_RE: Regex = Regex::new(r"\$[\d,]+\.?\d*").unwrap();
    static ref PERCENT_RE: Regex = Regex::new(r"\d+\.?\d*%").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyResult {
    pub consistent: bool,
    pub inconsistencies: Vec<String>,
}

/// Distinct matches in first-seen order
fn distinct_matches<'a>(re: &Regex, text: &'a str) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for m in re.find_iter(text) {
        if !seen.contains(&m.as_str()) {
            seen.push(m.as_str());
        }
    }
    seen
}

pub fn check_numerical_consistency(response: &str, tool_outputs: &[String]) -> ConsistencyResult {
    let tool_data = tool_outputs.join(" ");
    let mut inconsistencies = Vec::new();

    for dollar in distinct_matches(&DOLLAR_RE, response) {
        let bare = dollar.replace(['$', ','], "");
        if !tool_data.contains(&bare) && !tool_data.contains(dollar) {
            inconsistencies.push(format!("Dollar amount {} not found in tool data", dollar));
        }
    }

    for pct in distinct_matches(&PERCENT_RE, response) {
        let bare = pct.trim_end_matches('%');
        if !tool_data.contains(bare) && !tool_data.contains(pct) {
            inconsistencies.push(format!("Percentage {} not found in tool data", pct));
        }
    }

    ConsistencyResult {
        consistent: inconsistencies.is_empty(),
        inconsistencies,
    }
}
