//! Cost and feedback bookkeeping
//!
//! Process-wide ring buffers used for reporting only. Each append is atomic;
//! the oldest record is evicted once capacity is reached.

pub mod cost;
pub mod feedback;

pub use cost::{CostRecord, CostSummary, CostTracker};
pub use feedback::{FeedbackRecord, FeedbackStore, FeedbackSummary};

use sha2::{Digest, Sha256};

/// Short, log-safe fingerprint of a user token
pub fn token_fingerprint(token: &str) -> String {
    let hash = Sha256::digest(token.as_bytes());
    hex::encode(&hash[..6])
}
