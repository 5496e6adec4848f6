//! Hallucination detection
//!
//! Flags ticker-like symbols the answer mentions but no tool returned, when
//! the surrounding text treats them as an instrument.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

lazy_static! {
    static ref TICKER_RE: Regex = Regex::new(r"\b[A-Z]{1,5}\b").unwrap();
}

/// Uppercase words that are never treated as tickers
pub const IGNORE_WORDS: &[&str] = &[
    "USD", "EUR", "GBP", "ETF", "CEO", "IPO", "GDP", "YTD", "BUY", "SELL",
    "THE", "AND", "FOR", "NOT", "BUT", "ARE", "ALL", "CAN", "HAS", "HER",
    "ONE", "OUR", "OUT", "YOU", "DAY", "GET", "HIS", "HOW", "ITS", "MAY",
    "NEW", "NOW", "OLD", "SEE", "WAY", "WHO", "DID", "TOP", "FEE",
];

/// Words that mark the preceding symbol as an instrument
const INSTRUMENT_CONTEXT: &str = "stock|shares|holding|position|etf|fund";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HallucinationResult {
    pub detected: bool,
    pub unknown_tickers: Vec<String>,
}

fn ticker_set(text: &str) -> HashSet<&str> {
    TICKER_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|t| !IGNORE_WORDS.contains(t))
        .collect()
}

fn used_as_instrument(ticker: &str, response: &str) -> bool {
    let t = regex::escape(ticker);
    let pattern = format!(r"(?i)(\$\s*{t}|{t}\s+(?:{ctx}))", t = t, ctx = INSTRUMENT_CONTEXT);
    Regex::new(&pattern)
        .map(|re| re.is_match(response))
        .unwrap_or(false)
}

pub fn check_hallucination(response: &str, tool_outputs: &[String]) -> HallucinationResult {
    let tool_data = tool_outputs.join(" ");
    let known = ticker_set(&tool_data);

    let unknown_tickers: Vec<String> = ticker_set(response)
        .into_iter()
        .filter(|t| !known.contains(t))
        .filter(|t| used_as_instrument(t, response))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    HallucinationResult {
        detected: !unknown_tickers.is_empty(),
        unknown_tickers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> Vec<String> {
        vec![r#"{"top_holdings": [{"symbol": "VOO"}, {"symbol": "AAPL"}]}"#.to_string()]
    }

    #[test]
    fn test_known_tickers_pass() {
        let result = check_hallucination("You hold VOO shares and AAPL stock.", &outputs());
        assert!(!result.detected);
        assert!(result.unknown_tickers.is_empty());
    }

    #[test]
    fn test_unknown_ticker_in_instrument_context_is_flagged() {
        let result = check_hallucination(
            "Your TSLA position is large and $NVDA is up.",
            &outputs(),
        );
        assert!(result.detected);
        assert_eq!(result.unknown_tickers, vec!["NVDA".to_string(), "TSLA".to_string()]);
    }

    #[test]
    fn test_context_match_is_case_insensitive() {
        let result = check_hallucination("Consider QQQ Fund exposure", &outputs());
        assert_eq!(result.unknown_tickers, vec!["QQQ".to_string()]);
    }

    #[test]
    fn test_unknown_token_without_context_is_ignored() {
        let result = check_hallucination("The SEC filed a report about NASA.", &outputs());
        assert!(!result.detected);
    }

    #[test]
    fn test_stop_words_are_ignored() {
        let result = check_hallucination("USD shares and ETF holding", &[]);
        assert!(!result.detected);
    }
}
