// src/config.rs

use std::env;

use dotenvy::dotenv;
use serde::Serialize;

/// Questions are served in fixed-size pages.
pub const BATCH_SIZE: usize = 10;

/// Submission opens once `min(MIN_REQUIRED_TO_SUBMIT, total)` questions are attempted.
/// Fixed product constant, no configuration hook.
pub const MIN_REQUIRED_TO_SUBMIT: usize = 30;

/// Every question carries exactly four options.
pub const OPTIONS_PER_QUESTION: usize = 4;

/// Subscription level at or above which gated actions are free of charge.
pub const FREE_ACCESS_LEVEL: i32 = 2;

/// Question-count chunk used to scale the deep-analysis price for subscribers.
pub const ANALYSIS_COST_CHUNK: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub costs: CostTable,
}

/// Named credit costs for every paid action class.
///
/// The profile-related entries are served read-only to the profile surface;
/// the remaining four gate endpoints owned by this service.
#[derive(Debug, Clone, Serialize)]
pub struct CostTable {
    pub premium_test_start: i64,
    pub deep_analysis_base: i64,
    pub history_reopen: i64,
    pub profile_edit: i64,
    pub display_name_change: i64,
    pub audio_narration: i64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            premium_test_start: 10,
            deep_analysis_base: 10,
            history_reopen: 5,
            profile_edit: 2,
            display_name_change: 5,
            audio_narration: 3,
        }
    }
}

impl CostTable {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            premium_test_start: cost_var("COST_PREMIUM_TEST_START", defaults.premium_test_start),
            deep_analysis_base: cost_var("COST_DEEP_ANALYSIS_BASE", defaults.deep_analysis_base),
            history_reopen: cost_var("COST_HISTORY_REOPEN", defaults.history_reopen),
            profile_edit: cost_var("COST_PROFILE_EDIT", defaults.profile_edit),
            display_name_change: cost_var("COST_DISPLAY_NAME_CHANGE", defaults.display_name_change),
            audio_narration: cost_var("COST_AUDIO_NARRATION", defaults.audio_narration),
        }
    }
}

fn cost_var(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            costs: CostTable::from_env(),
        }
    }
}
