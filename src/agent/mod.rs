//! Turn orchestrator
//!
//! CLASSIFY → RECALL → INVOKE (scoped source) → VERIFY → PRICE → REMEMBER
//!
//! `handle_turn` never fails: upstream failures degrade into a fixed,
//! user-safe message with a machine-readable `ErrorCode`.

use crate::catalog::{model_spec, DEFAULT_MODEL_ID};
use crate::client::PortfolioSource;
use crate::config::{clamp_iterations, DEFAULT_MAX_AGENT_ITERATIONS};
use crate::error::OrchestrationError;
use crate::memory::MemoryStore;
use crate::models::{ChatMessage, ErrorCode, TurnRequest, TurnResult};
use crate::prompts::build_system_prompt;
use crate::runtime::{AgentRuntime, MessageKind, RuntimeMessage, RuntimeRequest};
use crate::scope::with_source;
use crate::skills::{Skill, SkillClassifier};
use crate::tools::ToolRegistry;
use crate::tracking::{token_fingerprint, CostTracker};
use crate::verification::VerificationPipeline;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const COST_OPERATION: &str = "finance_query";

const AUTH_EXPIRED_MESSAGE: &str = "Your portfolio session has expired. Please log in again.";
const GENERIC_ERROR_MESSAGE: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

/// What the runtime produced, flattened for verification and pricing
#[derive(Debug, Default)]
struct Transcript {
    answer: String,
    tools_called: Vec<String>,
    tool_outputs: Vec<String>,
    input_tokens: u64,
    output_tokens: u64,
}

fn usage_field(usage: &Value, primary: &str, fallback: &str) -> u64 {
    usage
        .get(primary)
        .and_then(Value::as_u64)
        .or_else(|| usage.get(fallback).and_then(Value::as_u64))
        .unwrap_or(0)
}

fn collect_transcript(messages: &[RuntimeMessage]) -> Transcript {
    let mut t = Transcript::default();

    for m in messages {
        if let Some(usage) = &m.usage {
            t.input_tokens += usage_field(usage, "input_tokens", "prompt_tokens");
            t.output_tokens += usage_field(usage, "output_tokens", "completion_tokens");
        }

        match m.kind {
            MessageKind::Assistant => {
                if let Some(content) = m.content.as_deref().filter(|c| !c.trim().is_empty()) {
                    t.answer = content.to_string();
                }
            }
            MessageKind::Tool => {
                if let Some(name) = &m.tool_name {
                    t.tools_called.push(name.clone());
                }
                t.tool_outputs.push(m.content.clone().unwrap_or_default());
            }
        }
    }

    t
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

/// Map a failed turn to its code, message and retry hint
fn degrade(err: &OrchestrationError) -> (ErrorCode, String, Option<u64>) {
    match err {
        OrchestrationError::RateLimited { retry_after_secs } => (
            ErrorCode::RateLimited,
            format!(
                "I'm being rate limited right now. Please try again in {} seconds.",
                retry_after_secs
            ),
            Some(*retry_after_secs),
        ),
        // only the data source reports an expired session; any other 401
        // (a rejected model API key) is an ordinary upstream failure
        OrchestrationError::AuthExpired => {
            (ErrorCode::AuthExpired, AUTH_EXPIRED_MESSAGE.to_string(), None)
        }
        OrchestrationError::Http { status, .. } => (ErrorCode::HttpError, http_message(*status), None),
        OrchestrationError::HttpClientError(e) => match e.status() {
            Some(s) => (ErrorCode::HttpError, http_message(s.as_u16()), None),
            None => (ErrorCode::Error, GENERIC_ERROR_MESSAGE.to_string(), None),
        },
        _ => (ErrorCode::Error, GENERIC_ERROR_MESSAGE.to_string(), None),
    }
}

fn http_message(status: u16) -> String {
    format!(
        "An upstream service returned an error (HTTP {}). Please try again later.",
        status
    )
}

/// Coordinates one conversational turn end to end
pub struct Orchestrator {
    runtime: Arc<dyn AgentRuntime>,
    tools: Arc<ToolRegistry>,
    memory: Arc<MemoryStore>,
    costs: Arc<CostTracker>,
    pipeline: VerificationPipeline,
    max_iterations: u32,
    default_model: String,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        tools: Arc<ToolRegistry>,
        memory: Arc<MemoryStore>,
        costs: Arc<CostTracker>,
    ) -> Self {
        Self {
            runtime,
            tools,
            memory,
            costs,
            pipeline: VerificationPipeline::new(),
            max_iterations: DEFAULT_MAX_AGENT_ITERATIONS,
            default_model: DEFAULT_MODEL_ID.to_string(),
        }
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = clamp_iterations(n);
        self
    }

    pub fn with_default_model(mut self, model_id: impl Into<String>) -> Self {
        self.default_model = model_id.into();
        self
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run one turn against `source`. Tools reach the source through the
    /// task-local scope only, so concurrent turns never see each other's.
    pub async fn handle_turn(
        &self,
        request: TurnRequest,
        source: Arc<dyn PortfolioSource>,
    ) -> TurnResult {
        let start_time = Instant::now();
        let trace_id = Uuid::new_v4().to_string();

        let skill = SkillClassifier::classify(&request.command);
        let model = model_spec(request.model_id.as_deref().unwrap_or(&self.default_model));
        let user = request
            .user_token
            .as_deref()
            .filter(|t| !t.trim().is_empty());

        info!(
            trace_id = %trace_id,
            skill = skill.name,
            model = model.model_id,
            user = %user.map(token_fingerprint).unwrap_or_default(),
            "Turn started"
        );

        let memory_context = user
            .map(|u| self.memory.build_context(u, &request.command))
            .unwrap_or_default();

        let mut messages = request.history.clone();
        messages.push(ChatMessage::user(request.command.clone()));

        let runtime_request = RuntimeRequest {
            model,
            system_prompt: build_system_prompt(skill, &memory_context),
            messages,
            iteration_cap: self.max_iterations,
        };

        let produced = match with_source(
            source,
            self.runtime.invoke(runtime_request, &self.tools),
        )
        .await
        {
            Ok(produced) => produced,
            Err(err) => return self.failed_turn(err, trace_id, model.api_model_name, skill),
        };

        let transcript = collect_transcript(&produced);
        debug!(
            trace_id = %trace_id,
            tools = ?transcript.tools_called,
            input_tokens = transcript.input_tokens,
            output_tokens = transcript.output_tokens,
            "Runtime finished"
        );

        let verified = self.pipeline.verify(&transcript.answer, &transcript.tool_outputs);

        let cost_usd = round6(self.costs.record(
            model.api_model_name,
            transcript.input_tokens,
            transcript.output_tokens,
            &trace_id,
            COST_OPERATION,
        ));

        if let Some(user) = user {
            self.memory
                .extract_preferences(user, &request.command, &transcript.tools_called);
            for (name, output) in transcript.tools_called.iter().zip(&transcript.tool_outputs) {
                self.memory.cache_fact(user, name, output);
            }
        }

        info!(
            trace_id = %trace_id,
            tools_called = transcript.tools_called.len(),
            cost_usd,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Turn completed"
        );

        TurnResult {
            response: verified.text,
            trace_id,
            tools_called: transcript.tools_called,
            cost_usd,
            model: model.api_model_name.to_string(),
            skill_used: skill.name.to_string(),
            verification: Some(verified.report),
            error: None,
            retry_after_secs: None,
        }
    }

    fn failed_turn(
        &self,
        err: OrchestrationError,
        trace_id: String,
        model: &str,
        skill: &Skill,
    ) -> TurnResult {
        let (code, response, retry_after_secs) = degrade(&err);
        warn!(trace_id = %trace_id, code = %code, error = %err, "Turn failed");

        TurnResult {
            response,
            trace_id,
            tools_called: Vec::new(),
            cost_usd: 0.0,
            model: model.to_string(),
            skill_used: skill.name.to_string(),
            verification: None,
            error: Some(code),
            retry_after_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RISK_TOLERANCE;
    use crate::testing::{MockMarket, MockPortfolio, ScriptedRuntime, Step};
    use crate::tools::create_default_registry;
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator(steps: Vec<Step>) -> (Orchestrator, Arc<ScriptedRuntime>) {
        let runtime = Arc::new(ScriptedRuntime::new(steps));
        let orchestrator = Orchestrator::new(
            runtime.clone(),
            Arc::new(create_default_registry(Arc::new(MockMarket::new()))),
            Arc::new(MemoryStore::new()),
            Arc::new(CostTracker::new()),
        );
        (orchestrator, runtime)
    }

    #[tokio::test]
    async fn test_portfolio_summary_end_to_end() {
        let (orch, runtime) = orchestrator(vec![
            Step::Call("portfolio_summary", json!({})),
            Step::Answer("Your portfolio total value is $125000.5 across 4 holdings. VOO is the largest position."),
        ]);

        let result = orch
            .handle_turn(
                TurnRequest::new("Show me my portfolio summary"),
                Arc::new(MockPortfolio::new()),
            )
            .await;

        assert!(result.is_success());
        assert_eq!(result.skill_used, "portfolio_analysis");
        assert_eq!(result.tools_called, vec!["portfolio_summary"]);
        assert_eq!(result.model, "llama-3.3-70b-versatile");
        assert!(result.response.contains("$125000.5"));
        assert!(result.response.contains("Disclaimer"));
        assert!(result.cost_usd > 0.0);

        let report = result.verification.unwrap();
        assert!(report.numerical_consistent);
        assert!(report.disclaimer_injected);
        assert!(!report.hallucination_detected);

        let (system_prompt, messages) = &runtime.requests()[0];
        assert!(system_prompt.contains("ACTIVE SKILL: Portfolio Analysis"));
        assert_eq!(messages.last().unwrap().content, "Show me my portfolio summary");

        let summary = orch.costs().summary();
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.total_input_tokens, 300);
        assert_eq!(summary.total_output_tokens, 60);
    }

    #[tokio::test]
    async fn test_trade_requires_confirmation_then_executes() {
        let source = Arc::new(MockPortfolio::new());

        let (preview_orch, _) = orchestrator(vec![
            Step::Call(
                "add_trade",
                json!({ "symbol": "AAPL", "quantity": 10, "unit_price": 230, "date": "2025-01-15" }),
            ),
            Step::Answer("Please confirm: BUY 10 x AAPL @ $230.00."),
        ]);
        let first = preview_orch
            .handle_turn(
                TurnRequest::new("I bought 10 shares of AAPL at $230"),
                source.clone(),
            )
            .await;
        assert_eq!(first.skill_used, "trade_execution");
        assert_eq!(first.tools_called, vec!["add_trade"]);
        assert!(source.created_orders().is_empty());

        let (confirm_orch, _) = orchestrator(vec![
            Step::Call(
                "add_trade",
                json!({
                    "symbol": "AAPL", "quantity": 10, "unit_price": 230,
                    "date": "2025-01-15", "confirmed": true
                }),
            ),
            Step::Answer("Done. Added BUY 10 x AAPL."),
        ]);
        let second = confirm_orch
            .handle_turn(
                TurnRequest::new("yes, confirm the trade of 10 shares of AAPL"),
                source.clone(),
            )
            .await;
        assert!(second.is_success());

        let orders = source.created_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].quantity, 10.0);
        assert_eq!(orders[0].symbol, "AAPL");
        assert_eq!(orders[0].account_id, "acc-1");
    }

    #[tokio::test]
    async fn test_rate_limit_degrades_turn() {
        let (orch, _) = orchestrator(vec![Step::Fail(|| OrchestrationError::RateLimited {
            retry_after_secs: 30,
        })]);

        let result = orch
            .handle_turn(TurnRequest::new("What is AAPL at?"), Arc::new(MockPortfolio::new()))
            .await;

        assert_eq!(result.error, Some(ErrorCode::RateLimited));
        assert_eq!(result.retry_after_secs, Some(30));
        assert!(result.response.contains("30 seconds"));
        assert_eq!(result.cost_usd, 0.0);
        assert!(result.tools_called.is_empty());
        assert!(result.verification.is_none());
        assert!(orch.costs().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_tool_aborts_turn() {
        let (orch, _) = orchestrator(vec![
            Step::Call("portfolio_summary", json!({})),
            Step::Answer("unreachable"),
        ]);
        let source = MockPortfolio::new();
        source.fail_with(OrchestrationError::RateLimited { retry_after_secs: 5 });

        let result = orch
            .handle_turn(TurnRequest::new("portfolio overview"), Arc::new(source))
            .await;

        assert_eq!(result.error, Some(ErrorCode::RateLimited));
        assert_eq!(result.retry_after_secs, Some(5));
    }

    #[tokio::test]
    async fn test_unauthorized_source_means_expired_session() {
        let (orch, _) = orchestrator(vec![
            Step::Call("transactions", json!({})),
            Step::Answer("unreachable"),
        ]);
        let source = MockPortfolio::new();
        source.fail_with(OrchestrationError::AuthExpired);

        let result = orch
            .handle_turn(
                TurnRequest::new("show my transactions").with_user("user-a"),
                Arc::new(source),
            )
            .await;

        assert_eq!(result.error, Some(ErrorCode::AuthExpired));
        assert_eq!(result.response, AUTH_EXPIRED_MESSAGE);
        assert_eq!(orch.memory().stored_fact_count("user-a"), 0);
    }

    #[tokio::test]
    async fn test_upstream_status_is_http_error() {
        let (orch, _) = orchestrator(vec![Step::Fail(|| OrchestrationError::Http {
            status: 503,
            message: "down".to_string(),
        })]);
        let result = orch
            .handle_turn(TurnRequest::new("hello"), Arc::new(MockPortfolio::new()))
            .await;
        assert_eq!(result.error, Some(ErrorCode::HttpError));
        assert!(result.response.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_rejected_model_key_is_not_an_expired_session() {
        let (orch, _) = orchestrator(vec![Step::Fail(|| OrchestrationError::Http {
            status: 401,
            message: "Invalid API Key".to_string(),
        })]);
        let result = orch
            .handle_turn(
                TurnRequest::new("portfolio overview").with_user("user-a"),
                Arc::new(MockPortfolio::new()),
            )
            .await;

        assert_eq!(result.error, Some(ErrorCode::HttpError));
        assert!(result.response.contains("HTTP 401"));
        assert_ne!(result.response, AUTH_EXPIRED_MESSAGE);
    }

    #[tokio::test]
    async fn test_iteration_limit_is_generic_error() {
        let (orch, _) = orchestrator(vec![Step::Fail(|| OrchestrationError::IterationLimit(10))]);
        let result = orch
            .handle_turn(TurnRequest::new("hello"), Arc::new(MockPortfolio::new()))
            .await;
        assert_eq!(result.error, Some(ErrorCode::Error));
        assert_eq!(result.response, GENERIC_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_concurrent_turns_use_their_own_source() {
        let steps = || {
            vec![
                Step::Call(
                    "add_trade",
                    json!({
                        "symbol": "TSLA", "quantity": 1, "unit_price": 250,
                        "date": "2025-02-03", "confirmed": true
                    }),
                ),
                Step::Call("transactions", json!({ "symbol": "TSLA" })),
                Step::Answer("Recorded."),
            ]
        };
        // one orchestrator, so both turns share the same registry and tool instances
        let (orch, runtime) = orchestrator(steps());

        let source_a = Arc::new(MockPortfolio::new().with_latency(Duration::from_millis(15)));
        let source_b = Arc::new(MockPortfolio::new().with_latency(Duration::from_millis(5)));

        let (a, b) = tokio::join!(
            orch.handle_turn(TurnRequest::new("buy 1 share of TSLA"), source_a.clone()),
            orch.handle_turn(TurnRequest::new("buy 1 share of TSLA"), source_b.clone()),
        );

        assert!(a.is_success() && b.is_success());
        assert_eq!(a.tools_called, vec!["add_trade", "transactions"]);
        assert_eq!(b.tools_called, vec!["add_trade", "transactions"]);
        assert_eq!(runtime.requests().len(), 2);
        assert_eq!(source_a.created_orders().len(), 1);
        assert_eq!(source_b.created_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_updated_after_success() {
        let (orch, _) = orchestrator(vec![
            Step::Call("portfolio_performance", json!({ "date_range": "ytd" })),
            Step::Answer("Your portfolio return is 11.61% ytd."),
        ]);

        let result = orch
            .handle_turn(
                TurnRequest::new("How did I do ytd? I'm a conservative investor").with_user("user-a"),
                Arc::new(MockPortfolio::new()),
            )
            .await;
        assert!(result.is_success());

        let prefs = orch.memory().get_preferences("user-a");
        assert_eq!(prefs.get(RISK_TOLERANCE).map(String::as_str), Some("conservative"));
        assert!(orch
            .memory()
            .get_cached_fact("user-a", "portfolio_performance")
            .is_some());
        assert_eq!(orch.memory().stored_fact_count("user-b"), 0);
    }

    #[test]
    fn test_usage_accepts_both_field_names() {
        let messages = vec![
            RuntimeMessage::assistant("", Some(json!({ "prompt_tokens": 10, "completion_tokens": 2 }))),
            RuntimeMessage::tool("stock_price", "{}"),
            RuntimeMessage::assistant("final", Some(json!({ "input_tokens": 5, "output_tokens": 1 }))),
            RuntimeMessage::assistant("  ", None),
        ];
        let t = collect_transcript(&messages);
        assert_eq!(t.answer, "final");
        assert_eq!(t.input_tokens, 15);
        assert_eq!(t.output_tokens, 3);
        assert_eq!(t.tools_called, vec!["stock_price"]);
    }

    #[test]
    fn test_usage_counted_on_every_message_kind() {
        let mut tool = RuntimeMessage::tool("stock_price", "{}");
        tool.usage = Some(json!({ "input_tokens": 7, "output_tokens": 3 }));
        let messages = vec![
            tool,
            RuntimeMessage::assistant("AAPL is at 104", Some(json!({ "prompt_tokens": 20, "completion_tokens": 4 }))),
        ];

        let t = collect_transcript(&messages);
        assert_eq!(t.input_tokens, 27);
        assert_eq!(t.output_tokens, 7);
    }
}
