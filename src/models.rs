//! Core data models for the portfolio agent

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Machine-readable failure code attached to a degraded turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RateLimited,
    AuthExpired,
    HttpError,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Up,
    Down,
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

//
// ================= Turn =================
//

/// One inbound request for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    pub command: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Opaque per-user token; memory is skipped when absent.
    #[serde(default)]
    pub user_token: Option<String>,
}

impl TurnRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

//
// ================= Verification =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VerificationReport {
    pub numerical_consistent: bool,
    pub inconsistencies: Vec<String>,
    pub hallucination_detected: bool,
    pub unknown_tickers: Vec<String>,
    pub risk_warnings: Vec<String>,
    pub disclaimer_injected: bool,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub response: String,
    pub trace_id: String,
    pub tools_called: Vec<String>,
    pub cost_usd: f64,
    pub model: String,
    pub skill_used: String,
    /// Empty on failed turns.
    pub verification: Option<VerificationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl TurnResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::AuthExpired => "auth_expired",
            ErrorCode::HttpError => "http_error",
            ErrorCode::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rating::Up => "up",
            Rating::Down => "down",
        };
        write!(f, "{}", s)
    }
}
