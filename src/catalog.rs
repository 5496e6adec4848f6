//! Supported models and per-token pricing
//!
//! Both tables are immutable and built at compile time.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Groq,
    OpenAi,
    Anthropic,
}

impl Provider {
    /// Base URL of the provider's OpenAI-compatible chat API
    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelSpec {
    pub model_id: &'static str,
    pub provider: Provider,
    pub display_name: &'static str,
    pub api_model_name: &'static str,
    pub temperature: f32,
    pub is_free: bool,
}

pub const DEFAULT_MODEL_ID: &str = "llama-3.3-70b-versatile";

pub static SUPPORTED_MODELS: &[ModelSpec] = &[
    ModelSpec {
        model_id: "llama-3.3-70b-versatile",
        provider: Provider::Groq,
        display_name: "Llama 3.3 70B (Groq, free)",
        api_model_name: "llama-3.3-70b-versatile",
        temperature: 0.1,
        is_free: true,
    },
    ModelSpec {
        model_id: "gpt-4o-mini",
        provider: Provider::OpenAi,
        display_name: "GPT-4o Mini (OpenAI)",
        api_model_name: "gpt-4o-mini",
        temperature: 0.1,
        is_free: false,
    },
    ModelSpec {
        model_id: "gpt-4o",
        provider: Provider::OpenAi,
        display_name: "GPT-4o (OpenAI)",
        api_model_name: "gpt-4o",
        temperature: 0.1,
        is_free: false,
    },
    ModelSpec {
        model_id: "claude-haiku",
        provider: Provider::Anthropic,
        display_name: "Claude Haiku (Anthropic)",
        api_model_name: "claude-haiku-4-5-20251001",
        temperature: 0.1,
        is_free: false,
    },
];

/// Spec for `model_id`, falling back to the default model
pub fn model_spec(model_id: &str) -> &'static ModelSpec {
    SUPPORTED_MODELS
        .iter()
        .find(|m| m.model_id == model_id)
        .or_else(|| SUPPORTED_MODELS.iter().find(|m| m.model_id == DEFAULT_MODEL_ID))
        .unwrap_or(&SUPPORTED_MODELS[0])
}

/// USD per token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

const PER_MILLION: f64 = 1_000_000.0;

static MODEL_PRICING: &[(&str, Pricing)] = &[
    ("llama-3.3-70b-versatile", Pricing { input: 0.59 / PER_MILLION, output: 0.79 / PER_MILLION }),
    ("gpt-4o-mini", Pricing { input: 0.15 / PER_MILLION, output: 0.60 / PER_MILLION }),
    ("gpt-4o", Pricing { input: 2.50 / PER_MILLION, output: 10.00 / PER_MILLION }),
    ("claude-haiku-4-5-20251001", Pricing { input: 0.80 / PER_MILLION, output: 4.00 / PER_MILLION }),
];

/// Pricing keyed by API model name; unknown models are free
pub fn pricing(api_model_name: &str) -> Pricing {
    MODEL_PRICING
        .iter()
        .find(|(name, _)| *name == api_model_name)
        .map(|(_, p)| *p)
        .unwrap_or(Pricing { input: 0.0, output: 0.0 })
}

pub fn cost_usd(api_model_name: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let p = pricing(api_model_name);
    input_tokens as f64 * p.input + output_tokens as f64 * p.output
}
