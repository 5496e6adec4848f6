//! Tool trait and registry
//!
//! Portfolio tools read the data source bound to the current turn
//! (`scope::current_source`); market tools share one `MarketData` client.
//! Every tool returns structured JSON that the registry serializes for the
//! agent runtime.

pub mod market;
pub mod portfolio;
pub mod trade;

use crate::client::MarketData;
use crate::error::OrchestrationError;
use crate::models::ToolInput;
use crate::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Trait for a single agent-callable tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the accepted arguments
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<Value>;
}

/// Function declaration handed to the model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Run a tool and render its output for the model.
    ///
    /// Tool failures become an `{"error": ...}` payload the model can read.
    /// Only turn-fatal upstream errors (rate limiting, expired auth) are
    /// returned as `Err`.
    pub async fn execute(&self, name: &str, parameters: Value) -> Result<String> {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "Model requested unknown tool");
            return Ok(error_payload(format!("Unknown tool: {}", name)));
        };

        let input = ToolInput {
            tool_name: name.to_string(),
            parameters: if parameters.is_null() { json!({}) } else { parameters },
        };

        match tool.execute(&input).await {
            Ok(output) => {
                debug!(tool = name, "Tool executed");
                Ok(serde_json::to_string_pretty(&output)?)
            }
            Err(e) if e.is_turn_fatal() => {
                warn!(tool = name, error = %e, "Tool hit a turn-fatal upstream error");
                Err(e)
            }
            Err(e) => {
                debug!(tool = name, error = %e, "Tool failed");
                Ok(error_payload(e.to_string()))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn error_payload(message: String) -> String {
    json!({ "error": message }).to_string()
}

//
// ================= Parameter Helpers =================
//

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ))
    }
}

pub(crate) fn str_param<'a>(input: &'a ToolInput, key: &str) -> Option<&'a str> {
    input
        .parameters
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn require_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str> {
    ensure_object_parameters(input)?;
    str_param(input, key).ok_or_else(|| {
        OrchestrationError::InvalidToolInput(format!("Expected '{}' in tool_input", key))
    })
}

/// Numbers may arrive as JSON numbers or numeric strings
pub(crate) fn f64_param(input: &ToolInput, key: &str) -> Option<f64> {
    match input.parameters.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn require_f64(input: &ToolInput, key: &str) -> Result<f64> {
    f64_param(input, key).ok_or_else(|| {
        OrchestrationError::InvalidToolInput(format!("Expected numeric '{}' in tool_input", key))
    })
}

pub(crate) fn bool_param(input: &ToolInput, key: &str) -> bool {
    match input.parameters.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

//
// ================= Upstream JSON Helpers =================
//

pub(crate) fn num(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Pass an upstream number through unchanged, defaulting to 0
pub(crate) fn raw(v: &Value, key: &str) -> Value {
    v.get(key).filter(|x| !x.is_null()).cloned().unwrap_or(json!(0))
}

pub(crate) fn text(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Upstream ratios (0.125) to display percentages (12.5)
pub(crate) fn pct(v: &Value, key: &str) -> f64 {
    round2(num(v, key) * 100.0)
}

/// Items of a field that may be a list or an object keyed by id
pub(crate) fn items(v: &Value, key: &str) -> Vec<Value> {
    let field = if key.is_empty() { Some(v) } else { v.get(key) };
    match field {
        Some(Value::Array(list)) => list.clone(),
        Some(Value::Object(map)) => map.values().cloned().collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn direction(change: f64) -> &'static str {
    if change > 0.0 {
        "up"
    } else if change < 0.0 {
        "down"
    } else {
        "flat"
    }
}

/// Create the registry with every portfolio, trade and market tool.
pub fn create_default_registry(market: Arc<dyn MarketData>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(portfolio::PortfolioSummaryTool));
    registry.register(Arc::new(portfolio::PortfolioPerformanceTool));
    registry.register(Arc::new(portfolio::HoldingDetailTool));
    registry.register(Arc::new(portfolio::TransactionsTool));
    registry.register(Arc::new(portfolio::DividendHistoryTool));
    registry.register(Arc::new(portfolio::SymbolSearchTool));
    registry.register(Arc::new(portfolio::MarketSentimentTool));
    registry.register(Arc::new(trade::AddTradeTool));

    registry.register(Arc::new(market::StockPriceTool::new(market.clone())));
    registry.register(Arc::new(market::StockTrendTool::new(market.clone())));
    registry.register(Arc::new(market::SectorPerformanceTool::new(market.clone())));
    registry.register(Arc::new(market::StockVolumeTool::new(market)));

    registry
}
