//! Agent runtime boundary
//!
//! A runtime drives the model/tool loop for one turn and returns every
//! message it produced. Tool calls go through the `ToolRegistry` on the
//! caller's task so the turn's data-source scope stays visible.

pub mod openai;

pub use openai::ChatCompletionsRuntime;

use crate::catalog::ModelSpec;
use crate::models::ChatMessage;
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RuntimeRequest<'a> {
    pub model: &'a ModelSpec,
    pub system_prompt: String,
    /// Prior history followed by the new user message
    pub messages: Vec<ChatMessage>,
    pub iteration_cap: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuntimeMessage {
    pub kind: MessageKind,
    pub content: Option<String>,
    pub tool_name: Option<String>,
    /// Provider usage block, e.g. `{"prompt_tokens": .., "completion_tokens": ..}`
    pub usage: Option<Value>,
}

impl RuntimeMessage {
    pub fn assistant(content: impl Into<String>, usage: Option<Value>) -> Self {
        Self {
            kind: MessageKind::Assistant,
            content: Some(content.into()),
            tool_name: None,
            usage,
        }
    }

    pub fn tool(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Tool,
            content: Some(output.into()),
            tool_name: Some(name.into()),
            usage: None,
        }
    }
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run the model/tool loop. Hitting `iteration_cap` is an
    /// `IterationLimit` error; upstream 429s surface as `RateLimited`, other
    /// statuses as `Http`.
    async fn invoke(
        &self,
        request: RuntimeRequest<'_>,
        tools: &ToolRegistry,
    ) -> Result<Vec<RuntimeMessage>>;
}
