//! Per-user memory bank
//!
//! Preferences, feedback lessons and a short-lived fact cache, keyed by an
//! opaque user token. All state sits behind one coarse lock so every
//! operation is atomic with respect to concurrent turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

pub const MAX_LESSONS_PER_USER: usize = 50;
pub const MAX_RELEVANT_LESSONS: usize = 3;
pub const MIN_SHARED_TOKENS: usize = 2;
pub const DEFAULT_FACT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreference {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackLesson {
    pub query_pattern: String,
    pub lesson: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CachedFact {
    pub tool_name: String,
    pub output: String,
    pub cached_at: Instant,
}

#[derive(Debug, Default)]
struct UserMemory {
    preferences: BTreeMap<String, UserPreference>,
    /// Oldest first
    lessons: VecDeque<FeedbackLesson>,
    facts: HashMap<String, CachedFact>,
}

/// Process-wide memory store shared by all turns
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserMemory>>,
    fact_ttl: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_fact_ttl(DEFAULT_FACT_TTL)
    }

    pub fn with_fact_ttl(fact_ttl: Duration) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            fact_ttl,
        }
    }

    pub fn fact_ttl(&self) -> Duration {
        self.fact_ttl
    }

    // A panicked writer cannot leave a half-applied single-field update,
    // so a poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, UserMemory>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, UserMemory>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, fact: &CachedFact, now: Instant) -> bool {
        now.saturating_duration_since(fact.cached_at) < self.fact_ttl
    }

    // =============================
    // Preferences
    // =============================

    pub fn set_preference(&self, user: &str, key: &str, value: &str) {
        let mut users = self.write();
        users.entry(user.to_string()).or_default().preferences.insert(
            key.to_string(),
            UserPreference {
                key: key.to_string(),
                value: value.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn get_preferences(&self, user: &str) -> BTreeMap<String, String> {
        self.read()
            .get(user)
            .map(|m| preferences_of(m))
            .unwrap_or_default()
    }

    // =============================
    // Feedback Lessons
    // =============================

    pub fn add_lesson(&self, user: &str, query_pattern: &str, lesson: &str) {
        let mut users = self.write();
        let lessons = &mut users.entry(user.to_string()).or_default().lessons;

        lessons.push_back(FeedbackLesson {
            query_pattern: query_pattern.to_string(),
            lesson: lesson.to_string(),
            timestamp: Utc::now(),
        });

        while lessons.len() > MAX_LESSONS_PER_USER {
            lessons.pop_front();
        }
    }

    /// Up to three lessons whose pattern shares at least two tokens with the
    /// query. The most recent matches are kept, returned in the order they
    /// were added.
    pub fn get_relevant_lessons(&self, user: &str, query: &str) -> Vec<String> {
        self.read()
            .get(user)
            .map(|m| relevant_lessons_of(m, query))
            .unwrap_or_default()
    }

    pub fn lesson_count(&self, user: &str) -> usize {
        self.read().get(user).map(|m| m.lessons.len()).unwrap_or(0)
    }

    // =============================
    // Fact Cache
    // =============================

    pub fn cache_fact(&self, user: &str, tool_name: &str, output: &str) {
        let mut users = self.write();
        users.entry(user.to_string()).or_default().facts.insert(
            tool_name.to_string(),
            CachedFact {
                tool_name: tool_name.to_string(),
                output: output.to_string(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Live cached output, or `None`. Expired entries are dropped here.
    pub fn get_cached_fact(&self, user: &str, tool_name: &str) -> Option<String> {
        let now = Instant::now();
        let mut users = self.write();
        let facts = &mut users.get_mut(user)?.facts;

        match facts.get(tool_name) {
            Some(fact) if self.is_live(fact, now) => Some(fact.output.clone()),
            Some(_) => {
                facts.remove(tool_name);
                None
            }
            None => None,
        }
    }

    /// Number of entries physically held for a user, expired or not.
    pub fn stored_fact_count(&self, user: &str) -> usize {
        self.read().get(user).map(|m| m.facts.len()).unwrap_or(0)
    }

    // =============================
    // Context Builder
    // =============================

    /// Prompt block with preferences, relevant lessons and a note on live
    /// cached tools. Empty when there is nothing to say.
    pub fn build_context(&self, user: &str, query: &str) -> String {
        let users = self.read();
        let Some(memory) = users.get(user) else {
            return String::new();
        };

        let mut parts = Vec::with_capacity(3);

        let prefs = preferences_of(memory);
        if !prefs.is_empty() {
            let lines: Vec<String> = prefs.iter().map(|(k, v)| format!("- {}: {}", k, v)).collect();
            parts.push(format!("User Preferences:\n{}", lines.join("\n")));
        }

        let lessons = relevant_lessons_of(memory, query);
        if !lessons.is_empty() {
            let lines: Vec<String> = lessons.iter().map(|l| format!("- {}", l)).collect();
            parts.push(format!("Lessons from previous feedback:\n{}", lines.join("\n")));
        }

        let now = Instant::now();
        let mut cached: Vec<&str> = memory
            .facts
            .values()
            .filter(|f| self.is_live(f, now))
            .map(|f| f.tool_name.as_str())
            .collect();
        cached.sort_unstable();

        if !cached.is_empty() {
            parts.push(format!(
                "Recent data available (cached): {}. \
                 You may still call these tools if the user needs fresh data.",
                cached.join(", ")
            ));
        }

        parts.join("\n\n")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn preferences_of(memory: &UserMemory) -> BTreeMap<String, String> {
    memory
        .preferences
        .iter()
        .map(|(k, p)| (k.clone(), p.value.clone()))
        .collect()
}

fn tokens(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

fn relevant_lessons_of(memory: &UserMemory, query: &str) -> Vec<String> {
    let query_tokens = tokens(query);

    let mut matches: Vec<String> = memory
        .lessons
        .iter()
        .rev()
        .filter(|l| tokens(&l.query_pattern).intersection(&query_tokens).count() >= MIN_SHARED_TOKENS)
        .take(MAX_RELEVANT_LESSONS)
        .map(|l| l.lesson.clone())
        .collect();

    matches.reverse();
    matches
}
