// src/stores/mod.rs
//
// Narrow contracts for every collaborator the engine talks to. The engine
// never sees a concrete backing store; tests run against the in-memory
// implementations and production against Postgres.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        prize::PrizeRule,
        question::{ChapterKey, QuestionRecord},
        result::{HistorySummary, ResultArtifact},
        session::{AnswerMap, SessionState},
        wallet::{Subscription, Wallet},
    },
};

/// Returns the question bank for a chapter, or `None` when the chapter has
/// no content yet ("coming soon" is a first-class terminal state, not an
/// error).
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn fetch_bank(&self, key: &ChapterKey) -> Result<Option<Vec<QuestionRecord>>, AppError>;

    /// Admin upload path. The engine itself only reads.
    async fn put_bank(
        &self,
        key: &ChapterKey,
        questions: Vec<QuestionRecord>,
    ) -> Result<(), AppError>;
}

/// Key-value persistence for in-flight sessions, keyed
/// `progress:{user}:{chapter}`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SessionState>, AppError>;
    async fn set(&self, key: &str, state: &SessionState) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Currency and subscription ledger. Debits are atomic: they fail on an
/// insufficient balance instead of going negative.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Reads a wallet, materializing an empty one for first-time users.
    async fn wallet(&self, user_id: i64) -> Result<Wallet, AppError>;
    async fn credit(&self, user_id: i64, amount: i64) -> Result<i64, AppError>;
    async fn debit(&self, user_id: i64, amount: i64) -> Result<i64, AppError>;
    async fn set_auto_deduct(&self, user_id: i64, enabled: bool) -> Result<(), AppError>;
    /// Overwrites any existing subscription window.
    async fn set_subscription(&self, user_id: i64, sub: Subscription) -> Result<(), AppError>;
}

/// A finalized artifact plus the denormalized fields the history feed needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: i64,
    pub subject: String,
    pub chapter_id: String,
    pub class_level: String,
    /// The raw user answers (original snapshot indices), kept for review.
    pub answers: AnswerMap,
    pub artifact: ResultArtifact,
}

/// The single durable-store interface for finalized results.
///
/// `record` must be idempotent on the artifact id so the offline replay
/// queue can re-send entries without double-counting history.
#[async_trait]
pub trait ResultHistory: Send + Sync {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), AppError>;
    async fn get(&self, user_id: i64, artifact_id: Uuid)
    -> Result<Option<ResultArtifact>, AppError>;
    async fn list(&self, user_id: i64) -> Result<Vec<HistorySummary>, AppError>;
    /// Attaches the deep-analysis report. Returns `false` when a report was
    /// already present (the write happens at most once).
    async fn attach_analysis(
        &self,
        user_id: i64,
        artifact_id: Uuid,
        report: &str,
    ) -> Result<bool, AppError>;
}

/// Ordered prize-rule configuration. Read-only to the engine; the admin
/// surface appends.
#[async_trait]
pub trait RewardConfig: Send + Sync {
    async fn rules(&self) -> Result<Vec<PrizeRule>, AppError>;
    async fn add_rule(
        &self,
        enabled: bool,
        category: String,
        min_questions: usize,
        min_percentage: f64,
        reward: crate::models::prize::Reward,
    ) -> Result<PrizeRule, AppError>;
}

/// The full set of collaborator handles threaded through the application.
#[derive(Clone)]
pub struct Stores {
    pub content: std::sync::Arc<dyn ContentProvider>,
    pub progress: std::sync::Arc<dyn ProgressStore>,
    pub ledger: std::sync::Arc<dyn Ledger>,
    pub history: std::sync::Arc<dyn ResultHistory>,
    pub rewards: std::sync::Arc<dyn RewardConfig>,
}
