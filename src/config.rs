//! Runtime configuration from environment variables
//!
//! Binaries call `dotenv::dotenv()` first so a local `.env` file is honored.

use crate::catalog::{Provider, DEFAULT_MODEL_ID};
use std::env;

pub const DEFAULT_MAX_AGENT_ITERATIONS: u32 = 10;
pub const MAX_AGENT_ITERATIONS_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct Settings {
    pub ghostfolio_url: String,
    pub ghostfolio_access_token: String,
    pub groq_api_key: String,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub default_model: String,
    pub max_agent_iterations: u32,
    pub log_level: String,
    /// Bearer key for `/agent/*`; falls back to the Ghostfolio token
    pub agent_api_key: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ghostfolio_url: "http://localhost:3333".to_string(),
            ghostfolio_access_token: String::new(),
            groq_api_key: String::new(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            default_model: DEFAULT_MODEL_ID.to_string(),
            max_agent_iterations: DEFAULT_MAX_AGENT_ITERATIONS,
            log_level: "info".to_string(),
            agent_api_key: String::new(),
            port: 8000,
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_agent_iterations = var("MAX_AGENT_ITERATIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .map(clamp_iterations)
            .unwrap_or(defaults.max_agent_iterations);

        let port = var("PORT")
            .or_else(|| var("API_PORT"))
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        Self {
            ghostfolio_url: var("GHOSTFOLIO_URL").unwrap_or(defaults.ghostfolio_url),
            ghostfolio_access_token: var("GHOSTFOLIO_ACCESS_TOKEN").unwrap_or_default(),
            groq_api_key: var("GROQ_API_KEY").unwrap_or_default(),
            openai_api_key: var("OPENAI_API_KEY").unwrap_or_default(),
            anthropic_api_key: var("ANTHROPIC_API_KEY").unwrap_or_default(),
            default_model: var("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            max_agent_iterations,
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level).to_lowercase(),
            agent_api_key: var("AGENT_API_KEY").unwrap_or_default(),
            port,
        }
    }

    /// Key expected on `Authorization: Bearer` for the agent endpoints
    pub fn expected_api_key(&self) -> Option<&str> {
        [self.agent_api_key.as_str(), self.ghostfolio_access_token.as_str()]
            .into_iter()
            .find(|k| !k.is_empty())
    }

    pub fn provider_key(&self, provider: Provider) -> &str {
        match provider {
            Provider::Groq => &self.groq_api_key,
            Provider::OpenAi => &self.openai_api_key,
            Provider::Anthropic => &self.anthropic_api_key,
        }
    }

    pub fn provider_configured(&self, provider: Provider) -> bool {
        !self.provider_key(provider).is_empty()
    }
}

pub fn clamp_iterations(n: u32) -> u32 {
    n.clamp(1, MAX_AGENT_ITERATIONS_LIMIT)
}
