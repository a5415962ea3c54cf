// src/engine/credits.rs

use serde::Serialize;

use crate::{
    config::{ANALYSIS_COST_CHUNK, CostTable, FREE_ACCESS_LEVEL},
    error::AppError,
    stores::Ledger,
};

/// A paid action class with a named cost in the cost table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    PremiumTestStart,
    /// Deep-analysis pricing scales with the attempt's question count for
    /// subscribers; non-subscribers pay the flat base cost.
    DeepAnalysis {
        question_count: usize,
    },
    HistoryReopen,
    AudioNarration,
    ProfileEdit,
    DisplayNameChange,
}

impl ActionClass {
    pub fn name(&self) -> &'static str {
        match self {
            ActionClass::PremiumTestStart => "premium_test_start",
            ActionClass::DeepAnalysis { .. } => "deep_analysis",
            ActionClass::HistoryReopen => "history_reopen",
            ActionClass::AudioNarration => "audio_narration",
            ActionClass::ProfileEdit => "profile_edit",
            ActionClass::DisplayNameChange => "display_name_change",
        }
    }

    pub fn cost(&self, table: &CostTable, subscribed: bool) -> i64 {
        match self {
            ActionClass::PremiumTestStart => table.premium_test_start,
            ActionClass::DeepAnalysis { question_count } => {
                if subscribed {
                    scaled_analysis_cost(*question_count, table.deep_analysis_base)
                } else {
                    table.deep_analysis_base
                }
            }
            ActionClass::HistoryReopen => table.history_reopen,
            ActionClass::AudioNarration => table.audio_narration,
            ActionClass::ProfileEdit => table.profile_edit,
            ActionClass::DisplayNameChange => table.display_name_change,
        }
    }
}

/// `max(1, ceil(question_count / 50 * base))`, in integer arithmetic.
fn scaled_analysis_cost(question_count: usize, base: i64) -> i64 {
    let chunk = ANALYSIS_COST_CHUNK as i64;
    let numerator = question_count as i64 * base;
    let scaled = (numerator + chunk - 1) / chunk;
    scaled.max(1)
}

/// Caller identity and intent for one gated action.
#[derive(Debug, Clone)]
pub struct GateInput {
    pub user_id: i64,
    pub is_admin: bool,
    /// Explicit confirmation from the confirmation round trip.
    pub confirm: bool,
    /// Opt into silent deduction for future actions, honored only together
    /// with an explicit confirmation.
    pub enable_auto_deduct: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateOutcome {
    /// The action may run now. `charged` is what was debited (0 on bypass)
    /// and must be refunded if the action subsequently fails.
    Proceed { charged: i64 },
    /// The caller must repeat the request with `confirm: true`.
    ConfirmationRequired { cost: i64, balance: i64 },
}

/// The credit gate wrapping every paid action.
///
/// Bypass order: zero cost, administrative role, then an active subscription
/// at the free-access level. An insufficient balance rejects without any
/// mutation. The auto-deduct preference skips the confirmation round trip.
pub async fn authorize(
    ledger: &dyn Ledger,
    costs: &CostTable,
    action: &ActionClass,
    input: &GateInput,
) -> Result<GateOutcome, AppError> {
    let wallet = ledger.wallet(input.user_id).await?;
    let subscription = wallet.active_subscription();
    let cost = action.cost(costs, subscription.is_some());

    let free_by_subscription = subscription.is_some_and(|s| s.level >= FREE_ACCESS_LEVEL);
    if cost == 0 || input.is_admin || free_by_subscription {
        return Ok(GateOutcome::Proceed { charged: 0 });
    }

    if wallet.balance < cost {
        return Err(AppError::InsufficientBalance {
            cost,
            balance: wallet.balance,
        });
    }

    if !wallet.auto_deduct && !input.confirm {
        return Ok(GateOutcome::ConfirmationRequired {
            cost,
            balance: wallet.balance,
        });
    }

    if input.confirm && input.enable_auto_deduct && !wallet.auto_deduct {
        ledger.set_auto_deduct(input.user_id, true).await?;
    }

    let balance = ledger.debit(input.user_id, cost).await?;
    tracing::info!(
        "charged {} credits for {} from user {} (balance {})",
        cost,
        action.name(),
        input.user_id,
        balance
    );
    Ok(GateOutcome::Proceed { charged: cost })
}

/// Returns a charge after a downstream failure, so a user is never left
/// debited without the paid content having been granted.
pub async fn refund(ledger: &dyn Ledger, user_id: i64, charged: i64) {
    if charged <= 0 {
        return;
    }
    match ledger.credit(user_id, charged).await {
        Ok(balance) => {
            tracing::warn!(
                "refunded {} credits to user {} after failed action (balance {})",
                charged,
                user_id,
                balance
            );
        }
        Err(e) => {
            tracing::error!("failed to refund {} credits to user {}: {}", charged, user_id, e);
        }
    }
}
