//! Disclaimer injection

use crate::prompts::FINANCIAL_DISCLAIMER;

pub const DISCLAIMER_TRIGGERS: &[&str] = &[
    "return", "performance", "gain", "loss", "risk", "volatility",
    "allocation", "diversification", "dividend", "yield", "growth",
    "investment", "portfolio", "value", "profit",
];

pub fn needs_disclaimer(response: &str) -> bool {
    let lowered = response.to_lowercase();
    DISCLAIMER_TRIGGERS.iter().any(|t| lowered.contains(t)) && !response.contains(FINANCIAL_DISCLAIMER)
}

/// Append the disclaimer once when the text talks about finance
pub fn inject_disclaimer(response: &str) -> String {
    if needs_disclaimer(response) {
        format!("{}{}", response, FINANCIAL_DISCLAIMER)
    } else {
        response.to_string()
    }
}
