//! Portfolio Agent
//!
//! A conversational finance assistant that:
//! - Routes each question to a skill with its own prompt and preferred tools
//! - Answers through an LLM tool loop over a Ghostfolio portfolio and Yahoo market data
//! - Scopes the portfolio data source to the turn, so concurrent users never mix
//! - Verifies answers against tool outputs before returning them
//! - Remembers per-user preferences, feedback lessons and recent facts
//!
//! TURN LOOP:
//! CLASSIFY → RECALL → INVOKE → VERIFY → PRICE → REMEMBER

pub mod agent;
pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod prompts;
pub mod runtime;
pub mod scope;
pub mod skills;
pub mod tools;
pub mod tracking;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Result;

// Re-export common types
pub use agent::Orchestrator;
pub use config::Settings;
pub use models::*;
pub use skills::{Skill, SkillClassifier};
