//! Risk threshold enforcement
//!
//! Scans structured tool outputs for concentration and drawdown levels that
//! must be surfaced to the user.

use serde_json::Value;

pub const SINGLE_HOLDING_CONCENTRATION_PCT: f64 = 25.0;
pub const TOP_3_CONCENTRATION_PCT: f64 = 60.0;
pub const MAX_DRAWDOWN_WARNING_PCT: f64 = -20.0;

fn number(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64)
}

/// Human-readable warnings; unparseable outputs are skipped.
pub fn check_risk_thresholds(tool_outputs: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();

    for output in tool_outputs {
        let Ok(Value::Object(data)) = serde_json::from_str::<Value>(output) else {
            continue;
        };

        if let Some(concentration) = data.get("concentration").and_then(Value::as_object) {
            let top = concentration.get("top_holding_pct");
            if number(top).is_some_and(|pct| pct > SINGLE_HOLDING_CONCENTRATION_PCT) {
                let symbol = concentration
                    .get("top_holding_symbol")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Unknown");
                warnings.push(format!(
                    "Concentration risk: {} represents {}% of portfolio (threshold: {:.1}%)",
                    symbol,
                    top.map(Value::to_string).unwrap_or_default(),
                    SINGLE_HOLDING_CONCENTRATION_PCT
                ));
            }

            let top3 = concentration.get("top_3_pct");
            if number(top3).is_some_and(|pct| pct > TOP_3_CONCENTRATION_PCT) {
                warnings.push(format!(
                    "Top 3 holdings represent {}% of portfolio",
                    top3.map(Value::to_string).unwrap_or_default()
                ));
            }
        }

        // a payload with a symbol describes one holding, not the portfolio
        let net = data.get("current_net_performance_pct").or_else(|| {
            if data.contains_key("symbol") {
                None
            } else {
                data.get("net_performance_pct")
            }
        });
        if number(net).is_some_and(|pct| pct < MAX_DRAWDOWN_WARNING_PCT) {
            warnings.push(format!(
                "Significant loss: portfolio is down {}%",
                net.map(Value::to_string).unwrap_or_default()
            ));
        }
    }

    warnings
}
