//! REST API Server for the portfolio assistant
//!
//! `/agent/*` serves machine clients with a shared data source behind a
//! bearer key; `/chat/*` serves the chat UI, authenticating each user with
//! their own Ghostfolio token.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::catalog::SUPPORTED_MODELS;
use crate::client::{PortfolioSource, SourceConnector};
use crate::config::Settings;
use crate::models::{ChatMessage, Rating, TurnRequest};
use crate::tracking::{token_fingerprint, FeedbackStore};

pub const SERVICE_NAME: &str = "portfolio-agent";

/// History messages forwarded with each chat turn
pub const MAX_CHAT_HISTORY: usize = 18;

const TOKEN_HEADER: &str = "x-ghostfolio-token";
const LESSON_QUERY_CHARS: usize = 80;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub trace_id: String,
    pub rating: Rating,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub preferences: BTreeMap<String, String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> Reply {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(ApiResponse::error(message)))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub settings: Arc<Settings>,
    pub connector: Arc<dyn SourceConnector>,
    /// Source authenticated with the server's own token, if that succeeded
    pub shared_source: Option<Arc<dyn PortfolioSource>>,
    pub feedback: Arc<FeedbackStore>,
}

/// =============================
/// Helpers
/// =============================

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// 503 when no key is configured, 401 when the caller's doesn't match
fn require_api_key(state: &ApiState, headers: &HeaderMap) -> Result<(), Reply> {
    let Some(expected) = state.settings.expected_api_key() else {
        return Err(fail(
            StatusCode::SERVICE_UNAVAILABLE,
            "Agent API key is not configured",
        ));
    };
    match bearer(headers) {
        Some(given) if given == expected => Ok(()),
        _ => Err(fail(StatusCode::UNAUTHORIZED, "Invalid or missing API key")),
    }
}

fn user_token(headers: &HeaderMap) -> Result<String, Reply> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "Missing X-Ghostfolio-Token header"))
}

async fn connect_user(state: &ApiState, token: &str) -> Result<Arc<dyn PortfolioSource>, Reply> {
    state.connector.connect(token).await.map_err(|e| {
        warn!(user = %token_fingerprint(token), error = %e, "Ghostfolio authentication failed");
        fail(StatusCode::UNAUTHORIZED, "Ghostfolio authentication failed")
    })
}

fn recent_history(mut history: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if history.len() > MAX_CHAT_HISTORY {
        history.drain(..history.len() - MAX_CHAT_HISTORY);
    }
    history
}

fn feedback_lesson(query: &str) -> String {
    let excerpt: String = query.chars().take(LESSON_QUERY_CHARS).collect();
    format!(
        "A similar query ('{}') received negative feedback. Take extra care with accuracy and completeness.",
        excerpt
    )
}

/// =============================
/// Health & Catalog
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let providers: Vec<_> = SUPPORTED_MODELS
        .iter()
        .map(|m| m.provider)
        .filter(|p| state.settings.provider_configured(*p))
        .fold(Vec::new(), |mut acc, p| {
            if !acc.contains(&p) {
                acc.push(p);
            }
            acc
        });

    let data_source = match &state.shared_source {
        Some(source) => match source.accounts().await {
            Ok(_) => "connected",
            Err(e) => {
                warn!(error = %e, "Health check could not reach the portfolio service");
                "unavailable"
            }
        },
        None => "unavailable",
    };

    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "data_source": data_source,
        "providers": providers,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_models(State(state): State<ApiState>) -> Reply {
    let models: Vec<_> = SUPPORTED_MODELS
        .iter()
        .map(|m| {
            let is_default = m.model_id == state.settings.default_model;
            json!({
                "model_id": m.model_id,
                "display_name": m.display_name,
                "provider": m.provider,
                "is_free": m.is_free,
                "available": state.settings.provider_configured(m.provider),
                "default": is_default,
            })
        })
        .collect();
    ok(json!({ "models": models }))
}

/// =============================
/// Agent Endpoints
/// =============================

async fn agent_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> Reply {
    if let Err(reply) = require_api_key(&state, &headers) {
        return reply;
    }
    if req.command.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Command must not be empty");
    }
    let Some(source) = state.shared_source.clone() else {
        return fail(StatusCode::SERVICE_UNAVAILABLE, "Portfolio data source is unavailable");
    };

    info!(command = %req.command, "Received agent command");

    let mut turn = TurnRequest::new(req.command).with_history(req.history);
    turn.model_id = req.model_id;

    ok(state.orchestrator.handle_turn(turn, source).await)
}

async fn agent_costs(State(state): State<ApiState>, headers: HeaderMap) -> Reply {
    if let Err(reply) = require_api_key(&state, &headers) {
        return reply;
    }
    ok(state.orchestrator.costs().summary())
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_login(State(state): State<ApiState>, Json(req): Json<LoginRequest>) -> Reply {
    let token = req.access_token.trim();
    if token.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "access_token must not be empty");
    }
    match connect_user(&state, token).await {
        Ok(_) => {
            info!(user = %token_fingerprint(token), "User logged in");
            ok(json!({ "authenticated": true }))
        }
        Err(reply) => reply,
    }
}

async fn chat_send(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> Reply {
    let token = match user_token(&headers) {
        Ok(t) => t,
        Err(reply) => return reply,
    };
    if req.message.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "Message must not be empty");
    }
    let source = match connect_user(&state, &token).await {
        Ok(s) => s,
        Err(reply) => return reply,
    };

    let mut turn = TurnRequest::new(req.message)
        .with_history(recent_history(req.history))
        .with_user(token);
    turn.model_id = req.model_id;

    ok(state.orchestrator.handle_turn(turn, source).await)
}

async fn chat_feedback(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<FeedbackRequest>,
) -> Reply {
    state.feedback.record(&req.trace_id, req.rating);

    let query = req.query.as_deref().map(str::trim).unwrap_or("");
    let mut lesson_added = false;
    if req.rating == Rating::Down && !query.is_empty() {
        if let Ok(token) = user_token(&headers) {
            state
                .orchestrator
                .memory()
                .add_lesson(&token, query, &feedback_lesson(query));
            lesson_added = true;
        }
    }

    info!(trace_id = %req.trace_id, rating = %req.rating, lesson_added, "Feedback recorded");
    ok(json!({ "recorded": true, "lesson_added": lesson_added }))
}

async fn feedback_summary(State(state): State<ApiState>) -> Reply {
    ok(state.feedback.summary())
}

async fn get_preferences(State(state): State<ApiState>, headers: HeaderMap) -> Reply {
    match user_token(&headers) {
        Ok(token) => ok(json!({
            "preferences": state.orchestrator.memory().get_preferences(&token)
        })),
        Err(reply) => reply,
    }
}

async fn put_preferences(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<PreferencesRequest>,
) -> Reply {
    let token = match user_token(&headers) {
        Ok(t) => t,
        Err(reply) => return reply,
    };
    let memory = state.orchestrator.memory();
    for (key, value) in &req.preferences {
        memory.set_preference(&token, key, value);
    }
    ok(json!({ "preferences": memory.get_preferences(&token) }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent/command", post(agent_command))
        .route("/agent/models", get(list_models))
        .route("/agent/costs", get(agent_costs))
        .route("/chat/models", get(list_models))
        .route("/chat/login", post(chat_login))
        .route("/chat/send", post(chat_send))
        .route("/chat/feedback", post(chat_feedback))
        .route("/chat/feedback/summary", get(feedback_summary))
        .route("/chat/preferences", get(get_preferences).put(put_preferences))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
