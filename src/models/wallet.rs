// src/models/wallet.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-boxed subscription window. Granting a new one overwrites any
/// existing window; end dates never stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub tier: String,
    pub level: i32,
    pub expires_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// One user's currency balance and preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: i64,
    pub balance: i64,
    /// When set, the credit gate debits silently instead of asking for
    /// confirmation.
    pub auto_deduct: bool,
    pub subscription: Option<Subscription>,
}

impl Wallet {
    pub fn empty(user_id: i64) -> Self {
        Self {
            user_id,
            balance: 0,
            auto_deduct: false,
            subscription: None,
        }
    }

    /// The subscription, filtered to an unexpired window.
    pub fn active_subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref().filter(|s| s.is_active())
    }
}
