//! Skill Classifier
//!
//! Routes a free-text query to one of a fixed set of skills. Each skill
//! carries the tools the agent should lean on and a prompt fragment.
//!
//! Scoring: `hits * 10 + priority`, where `hits` counts keywords found as
//! substrings of the lowercased query. Priority only breaks ties between
//! equal hit counts. Ties on the weighted score keep the skill registered
//! first.

use serde::Serialize;

/// Immutable skill descriptor
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Skill {
    pub name: &'static str,
    pub display_name: &'static str,
    pub keywords: &'static [&'static str],
    pub relevant_tools: &'static [&'static str],
    pub prompt_addon: &'static str,
    pub priority: u32,
}

pub const DEFAULT_SKILL_NAME: &str = "portfolio_analysis";

/// Static registry, iterated in registration order
pub static SKILLS: &[Skill] = &[
    Skill {
        name: "portfolio_analysis",
        display_name: "Portfolio Analysis",
        keywords: &[
            "portfolio", "summary", "overview", "holdings", "allocation",
            "total", "value", "what do i own", "asset", "worth",
        ],
        relevant_tools: &["portfolio_summary", "holding_detail"],
        prompt_addon: "Focus on portfolio composition and allocations. \
            Present holdings grouped by asset class with percentage weights. \
            Highlight the top holdings and cash position.",
        priority: 0,
    },
    Skill {
        name: "performance_tracking",
        display_name: "Performance Tracking",
        keywords: &[
            "performance", "return", "gain", "loss", "profit",
            "how did", "ytd", "chart", "growth", "up", "down",
        ],
        relevant_tools: &["portfolio_performance", "portfolio_summary"],
        prompt_addon: "Focus on time-range performance comparisons. \
            Present net and gross returns clearly. \
            Compare across time periods when relevant.",
        priority: 1,
    },
    Skill {
        name: "trade_execution",
        display_name: "Trade Execution",
        keywords: &[
            "buy", "sell", "bought", "sold", "trade", "purchase",
            "add trade", "shares of", "units of",
        ],
        relevant_tools: &["add_trade", "symbol_search"],
        prompt_addon: "CRITICAL: Confirm ALL trade details before executing. \
            Always use symbol_search first if the user provides a company name instead of a ticker. \
            Validate quantity, price, and date before calling add_trade. \
            Call add_trade with confirmed=false first and only set confirmed=true after the user approves the preview.",
        priority: 2,
    },
    Skill {
        name: "risk_assessment",
        display_name: "Risk Assessment",
        keywords: &[
            "risk", "diversification", "diversified", "concentration", "sector",
            "geographic", "exposure", "safe", "volatile", "health",
        ],
        relevant_tools: &["market_sentiment", "portfolio_summary"],
        prompt_addon: "Focus on risk analysis and diversification. \
            Check concentration risk, sector exposure, and geographic distribution. \
            Always include specific risk flags and thresholds.",
        priority: 1,
    },
    Skill {
        name: "research",
        display_name: "Research",
        keywords: &[
            "search", "lookup", "find", "what is", "ticker", "symbol",
            "dividend", "history", "transactions", "orders",
        ],
        relevant_tools: &["symbol_search", "holding_detail", "dividend_history", "transactions"],
        prompt_addon: "Focus on data lookup and presentation. \
            Present transaction history chronologically. \
            For dividends, show total received and payment frequency.",
        priority: 1,
    },
    Skill {
        name: "market_data",
        display_name: "Market Data",
        keywords: &[
            "price", "current price", "trading at", "trend", "this week",
            "today", "volume", "sectors", "market", "intraday",
        ],
        relevant_tools: &["stock_price", "stock_trend", "stock_volume", "sector_performance"],
        prompt_addon: "Focus on live market data. \
            Quote prices with their currency and the time range they cover. \
            Summarize trends with start, end, high, low and percentage change.",
        priority: 1,
    },
];

/// Look up a skill by name
pub fn skill(name: &str) -> Option<&'static Skill> {
    SKILLS.iter().find(|s| s.name == name)
}

/// Skill used when nothing matches
pub fn default_skill() -> &'static Skill {
    skill(DEFAULT_SKILL_NAME).unwrap_or(&SKILLS[0])
}

/// Skill classifier
pub struct SkillClassifier;

impl SkillClassifier {
    /// Classify a query into the best-matching skill
    pub fn classify(query: &str) -> &'static Skill {
        let lowered = query.to_lowercase();

        let mut best: Option<&'static Skill> = None;
        let mut best_weighted = 0u32;

        for skill in SKILLS {
            let hits = skill
                .keywords
                .iter()
                .filter(|kw| lowered.contains(**kw))
                .count() as u32;

            let weighted = hits * 10 + skill.priority;

            if hits > 0 && weighted > best_weighted {
                best_weighted = weighted;
                best = Some(skill);
            }
        }

        best.unwrap_or_else(default_skill)
    }
}
