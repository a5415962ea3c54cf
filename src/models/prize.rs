// src/models/prize.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// What a satisfied prize rule grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reward_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reward {
    Coins {
        amount: i64,
    },
    Subscription {
        tier: String,
        level: i32,
        duration_hours: i64,
    },
}

/// A configured threshold-based reward definition, evaluated against one
/// completed attempt. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeRule {
    pub id: i64,
    pub enabled: bool,
    pub category: String,
    pub min_questions: usize,
    pub min_percentage: f64,
    #[serde(flatten)]
    pub reward: Reward,
}

/// DTO for creating a prize rule through the admin surface.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePrizeRuleRequest {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub min_questions: usize,
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_percentage: f64,
    #[serde(flatten)]
    pub reward: Reward,
}

fn default_enabled() -> bool {
    true
}
