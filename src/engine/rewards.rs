// src/engine/rewards.rs

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::{
    error::AppError,
    models::{
        prize::{PrizeRule, Reward},
        wallet::Subscription,
    },
    stores::Ledger,
};

/// The reward actually granted for one attempt, echoed in the submit
/// response and logged.
#[derive(Debug, Clone, Serialize)]
pub struct GrantedReward {
    pub rule_id: i64,
    #[serde(flatten)]
    pub reward: Reward,
}

/// Selects the single rule an attempt satisfies.
///
/// Survivors must be enabled, match the assessment category, and meet both
/// thresholds; among them the highest `min_percentage` wins (the most
/// demanding satisfied rule, not the first match).
pub fn select_rule<'a>(
    rules: &'a [PrizeRule],
    category: &str,
    attempted: usize,
    percentage: f64,
) -> Option<&'a PrizeRule> {
    rules
        .iter()
        .filter(|r| r.enabled)
        .filter(|r| r.category == category)
        .filter(|r| attempted >= r.min_questions && percentage >= r.min_percentage)
        .fold(None, |best: Option<&PrizeRule>, r| match best {
            Some(b) if b.min_percentage >= r.min_percentage => Some(b),
            _ => Some(r),
        })
}

/// Applies exactly one reward through the ledger: a coin credit, or a
/// subscription window at the rule's tier/level. Subscription grants
/// overwrite any existing end date; they never stack.
pub async fn apply_reward(
    ledger: &dyn Ledger,
    user_id: i64,
    rule: &PrizeRule,
) -> Result<GrantedReward, AppError> {
    match &rule.reward {
        Reward::Coins { amount } => {
            let balance = ledger.credit(user_id, *amount).await?;
            tracing::info!(
                "prize rule {} granted {} coins to user {} (balance {})",
                rule.id,
                amount,
                user_id,
                balance
            );
        }
        Reward::Subscription {
            tier,
            level,
            duration_hours,
        } => {
            let subscription = Subscription {
                tier: tier.clone(),
                level: *level,
                expires_at: Utc::now() + Duration::hours(*duration_hours),
            };
            ledger.set_subscription(user_id, subscription).await?;
            tracing::info!(
                "prize rule {} granted {}h of '{}' (level {}) to user {}",
                rule.id,
                duration_hours,
                tier,
                level,
                user_id
            );
        }
    }

    Ok(GrantedReward {
        rule_id: rule.id,
        reward: rule.reward.clone(),
    })
}
