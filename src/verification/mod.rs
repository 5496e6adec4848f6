//! Verification pipeline for generated answers
//!
//! Heuristic, deterministic checks run over the final answer and the raw
//! tool outputs of a turn. Findings are advisory and land in the
//! `VerificationReport`; risk warnings are also appended to the answer.
//! None of the checks can fail the turn.

pub mod disclaimer;
pub mod hallucination;
pub mod numerical;
pub mod risk;

pub use disclaimer::inject_disclaimer;
pub use hallucination::{check_hallucination, HallucinationResult};
pub use numerical::{check_numerical_consistency, ConsistencyResult};
pub use risk::check_risk_thresholds;

use crate::models::VerificationReport;
use crate::prompts::risk_notice;
use tracing::info;

/// Answer text after verification plus the report
#[derive(Debug, Clone)]
pub struct VerifiedAnswer {
    pub text: String,
    pub report: VerificationReport,
}

/// Runs the checks in a fixed order: consistency, hallucination, risk,
/// then disclaimer.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerificationPipeline;

impl VerificationPipeline {
    pub fn new() -> Self {
        Self
    }

    pub fn verify(&self, response: &str, tool_outputs: &[String]) -> VerifiedAnswer {
        let consistency = check_numerical_consistency(response, tool_outputs);
        let hallucination = check_hallucination(response, tool_outputs);
        let risk_warnings = check_risk_thresholds(tool_outputs);

        let mut text = response.to_string();
        for warning in &risk_warnings {
            text.push_str("\n\n");
            text.push_str(&risk_notice(warning));
        }

        let with_disclaimer = inject_disclaimer(&text);
        let disclaimer_injected = with_disclaimer.len() != text.len();

        info!(
            numerical_consistent = consistency.consistent,
            hallucination_detected = hallucination.detected,
            risk_warnings = risk_warnings.len(),
            disclaimer_injected,
            "Verification completed"
        );

        VerifiedAnswer {
            text: with_disclaimer,
            report: VerificationReport {
                numerical_consistent: consistency.consistent,
                inconsistencies: consistency.inconsistencies,
                hallucination_detected: hallucination.detected,
                unknown_tickers: hallucination.unknown_tickers,
                risk_warnings,
                disclaimer_injected,
            },
        }
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::FINANCIAL_DISCLAIMER;
    use serde_json::json;

    #[test]
    fn test_clean_answer() {
        let outputs = vec![json!({"total_value": 5000}).to_string()];
        let verified = VerificationPipeline::new().verify("Your portfolio value is $5000 today", &outputs);

        assert!(verified.report.numerical_consistent);
        assert!(!verified.report.hallucination_detected);
        assert!(verified.report.risk_warnings.is_empty());
        assert!(verified.report.disclaimer_injected);
        assert!(verified.text.ends_with(FINANCIAL_DISCLAIMER));
    }

    #[test]
    fn test_risk_warnings_precede_disclaimer() {
        let outputs = vec![json!({
            "concentration": {"top_holding_pct": 40.0, "top_holding_symbol": "VOO", "top_3_pct": 50.0}
        })
        .to_string()];

        let verified = VerificationPipeline::new().verify("Here is your breakdown.", &outputs);

        assert_eq!(verified.report.risk_warnings.len(), 1);
        let notice = verified.text.find("**Risk Notice**: Concentration risk: VOO").unwrap();
        let disclaimer = verified.text.find(FINANCIAL_DISCLAIMER).unwrap();
        assert!(notice < disclaimer);
    }

    #[test]
    fn test_no_trigger_no_change() {
        let verified = VerificationPipeline::new().verify("Hi there!", &[]);
        assert_eq!(verified.text, "Hi there!");
        assert!(!verified.report.disclaimer_injected);
    }

    #[test]
    fn test_malformed_outputs_do_not_panic() {
        let outputs = vec!["{".to_string(), "\u{0}".to_string(), String::new()];
        let verified = VerificationPipeline::new().verify("$1,2,3 and 4.%", &outputs);
        assert!(!verified.report.numerical_consistent);
        assert!(verified.report.risk_warnings.is_empty());
    }
}
