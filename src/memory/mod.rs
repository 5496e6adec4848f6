//! Agent Memory System
//!
//! Per-user preferences, feedback lessons and a short-TTL fact cache used to
//! augment the agent prompt across turns

pub mod extract;
pub mod store;

pub use extract::{PREFERRED_TIME_RANGE, RISK_TOLERANCE};
pub use store::{FeedbackLesson, MemoryStore, UserPreference, DEFAULT_FACT_TTL};
