//! OpenAI-compatible chat-completions runtime
//!
//! Groq, OpenAI and Anthropic all expose `POST {base}/chat/completions` with
//! function calling, so one adapter serves the whole model catalog.

use super::{AgentRuntime, RuntimeMessage, RuntimeRequest};
use crate::catalog::{ModelSpec, Provider};
use crate::client::{http_client, status_error};
use crate::config::Settings;
use crate::error::OrchestrationError;
use crate::models::ChatRole;
use crate::tools::{ToolDefinition, ToolRegistry};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

//
// ================= Runtime =================
//

/// Reusable chat-completions client (connection-pooled)
pub struct ChatCompletionsRuntime {
    client: Client,
    settings: Settings,
    base_url_override: Option<String>,
}

impl ChatCompletionsRuntime {
    pub fn new(settings: Settings) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            settings,
            base_url_override: None,
        })
    }

    /// Send every provider to one endpoint (local gateways, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url_override = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, provider: Provider) -> String {
        let base = self
            .base_url_override
            .as_deref()
            .unwrap_or_else(|| provider.base_url());
        format!("{}/chat/completions", base)
    }

    async fn complete(
        &self,
        model: &ModelSpec,
        messages: &[WireMessage],
        definitions: &[ToolDefinition],
    ) -> Result<CompletionResponse> {
        let api_key = self.settings.provider_key(model.provider);
        if api_key.is_empty() {
            return Err(OrchestrationError::ConfigError(format!(
                "No API key configured for model {}",
                model.model_id
            )));
        }

        let request = CompletionRequest {
            model: model.api_model_name,
            temperature: model.temperature,
            messages,
            tools: definitions
                .iter()
                .map(|function| WireTool {
                    kind: "function",
                    function,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint(model.provider))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| OrchestrationError::RuntimeError(format!("Invalid completion response: {}", e)))
    }
}

#[async_trait]
impl AgentRuntime for ChatCompletionsRuntime {
    async fn invoke(
        &self,
        request: RuntimeRequest<'_>,
        tools: &ToolRegistry,
    ) -> Result<Vec<RuntimeMessage>> {
        let definitions = tools.definitions();

        let mut wire = Vec::with_capacity(request.messages.len() + 1);
        wire.push(WireMessage::text("system", &request.system_prompt));
        for m in &request.messages {
            let role = match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            wire.push(WireMessage::text(role, &m.content));
        }

        let mut produced = Vec::new();

        for iteration in 1..=request.iteration_cap {
            debug!(iteration, model = request.model.model_id, "Calling chat completions");
            let response = self.complete(request.model, &wire, &definitions).await?;

            let message = response
                .choices
                .into_iter()
                .next()
                .map(|c| c.message)
                .ok_or_else(|| OrchestrationError::RuntimeError("Completion had no choices".to_string()))?;

            let calls = message.tool_calls.unwrap_or_default();
            produced.push(RuntimeMessage::assistant(
                message.content.clone().unwrap_or_default(),
                response.usage,
            ));

            if calls.is_empty() {
                info!(iterations = iteration, "Agent loop finished");
                return Ok(produced);
            }

            wire.push(WireMessage {
                role: "assistant",
                content: message.content,
                tool_calls: calls.clone(),
                tool_call_id: None,
            });

            for call in calls {
                let output = match serde_json::from_str::<Value>(&call.function.arguments) {
                    Ok(args) => tools.execute(&call.function.name, args).await?,
                    Err(_) if call.function.arguments.trim().is_empty() => {
                        tools.execute(&call.function.name, json!({})).await?
                    }
                    Err(e) => json!({ "error": format!("Invalid tool arguments: {}", e) }).to_string(),
                };

                debug!(tool = %call.function.name, "Tool result returned to model");
                produced.push(RuntimeMessage::tool(&call.function.name, output.clone()));
                wire.push(WireMessage {
                    role: "tool",
                    content: Some(output),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(call.id),
                });
            }
        }

        Err(OrchestrationError::IterationLimit(request.iteration_cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model_spec;
    use crate::models::ChatMessage;
    use crate::testing::MockMarket;
    use crate::tools::create_default_registry;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> Settings {
        Settings {
            groq_api_key: "gsk-test".to_string(),
            ..Settings::default()
        }
    }

    fn registry() -> ToolRegistry {
        create_default_registry(Arc::new(MockMarket::new()))
    }

    fn request(cap: u32) -> RuntimeRequest<'static> {
        RuntimeRequest {
            model: model_spec("llama-3.3-70b-versatile"),
            system_prompt: "system".to_string(),
            messages: vec![ChatMessage::user("What is AAPL trading at?")],
            iteration_cap: cap,
        }
    }

    fn tool_call_body() -> Value {
        json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "stock_price", "arguments": "{\"symbol\":\"AAPL\"}" }
                }]
            }}],
            "usage": { "prompt_tokens": 100, "completion_tokens": 10 }
        })
    }

    fn answer_body() -> Value {
        json!({
            "choices": [{ "message": { "content": "AAPL is trading at $104.00." } }],
            "usage": { "prompt_tokens": 150, "completion_tokens": 20 }
        })
    }

    #[tokio::test]
    async fn test_tool_loop_then_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer gsk-test"))
            .and(body_partial_json(json!({ "model": "llama-3.3-70b-versatile" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer_body()))
            .mount(&server)
            .await;

        let runtime = ChatCompletionsRuntime::new(settings())
            .unwrap()
            .with_base_url(&server.uri());
        let messages = runtime.invoke(request(5), &registry()).await.unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].tool_name.as_deref(), Some("stock_price"));
        assert!(messages[1].content.as_deref().unwrap().contains("\"current_price\": 104.0"));
        assert_eq!(messages[2].content.as_deref(), Some("AAPL is trading at $104.00."));
        assert_eq!(messages[2].usage.as_ref().unwrap()["prompt_tokens"], 150);
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_call_body()))
            .mount(&server)
            .await;

        let runtime = ChatCompletionsRuntime::new(settings())
            .unwrap()
            .with_base_url(&server.uri());
        let err = runtime.invoke(request(2), &registry()).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::IterationLimit(2)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let runtime = ChatCompletionsRuntime::new(settings())
            .unwrap()
            .with_base_url(&server.uri());
        let err = runtime.invoke(request(3), &registry()).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::RateLimited { retry_after_secs: 12 }));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let runtime = ChatCompletionsRuntime::new(Settings::default()).unwrap();
        let err = runtime.invoke(request(3), &registry()).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigError(_)));
    }

    #[test]
    fn test_tool_message_serialization() {
        let msg = WireMessage {
            role: "tool",
            content: Some("{}".to_string()),
            tool_calls: Vec::new(),
            tool_call_id: Some("call_1".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("tool_calls").is_none());
    }
}
