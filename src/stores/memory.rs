// src/stores/memory.rs
//
// In-memory store implementations. They back the test suite and any
// offline/local deployment; the contracts match the Postgres versions.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    ContentProvider, HistoryEntry, Ledger, ProgressStore, ResultHistory, RewardConfig, Stores,
};
use crate::{
    error::AppError,
    models::{
        prize::{PrizeRule, Reward},
        question::{ChapterKey, QuestionRecord},
        result::{HistorySummary, ResultArtifact},
        session::SessionState,
        wallet::{Subscription, Wallet},
    },
};

#[derive(Default)]
pub struct MemoryContentProvider {
    banks: Mutex<HashMap<ChapterKey, Vec<QuestionRecord>>>,
}

impl MemoryContentProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentProvider for MemoryContentProvider {
    async fn fetch_bank(&self, key: &ChapterKey) -> Result<Option<Vec<QuestionRecord>>, AppError> {
        Ok(self.banks.lock().unwrap().get(key).cloned())
    }

    async fn put_bank(
        &self,
        key: &ChapterKey,
        questions: Vec<QuestionRecord>,
    ) -> Result<(), AppError> {
        self.banks.lock().unwrap().insert(key.clone(), questions);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<String, SessionState>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, key: &str) -> Result<Option<SessionState>, AppError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, state: &SessionState) -> Result<(), AppError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    wallets: Mutex<HashMap<i64, Wallet>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_wallet<T>(&self, user_id: i64, f: impl FnOnce(&mut Wallet) -> T) -> T {
        let mut wallets = self.wallets.lock().unwrap();
        let wallet = wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::empty(user_id));
        f(wallet)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn wallet(&self, user_id: i64) -> Result<Wallet, AppError> {
        Ok(self.with_wallet(user_id, |w| w.clone()))
    }

    async fn credit(&self, user_id: i64, amount: i64) -> Result<i64, AppError> {
        Ok(self.with_wallet(user_id, |w| {
            w.balance += amount;
            w.balance
        }))
    }

    async fn debit(&self, user_id: i64, amount: i64) -> Result<i64, AppError> {
        self.with_wallet(user_id, |w| {
            if w.balance < amount {
                Err(AppError::InsufficientBalance {
                    cost: amount,
                    balance: w.balance,
                })
            } else {
                w.balance -= amount;
                Ok(w.balance)
            }
        })
    }

    async fn set_auto_deduct(&self, user_id: i64, enabled: bool) -> Result<(), AppError> {
        self.with_wallet(user_id, |w| w.auto_deduct = enabled);
        Ok(())
    }

    async fn set_subscription(&self, user_id: i64, sub: Subscription) -> Result<(), AppError> {
        self.with_wallet(user_id, |w| w.subscription = Some(sub));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryResultHistory {
    entries: Mutex<HashMap<Uuid, HistoryEntry>>,
}

impl MemoryResultHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultHistory for MemoryResultHistory {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), AppError> {
        // Idempotent on the artifact id: replaying a durable entry is a no-op.
        self.entries
            .lock()
            .unwrap()
            .entry(entry.artifact.id)
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn get(
        &self,
        user_id: i64,
        artifact_id: Uuid,
    ) -> Result<Option<ResultArtifact>, AppError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&artifact_id)
            .filter(|e| e.user_id == user_id)
            .map(|e| e.artifact.clone()))
    }

    async fn list(&self, user_id: i64) -> Result<Vec<HistorySummary>, AppError> {
        let mut summaries: Vec<HistorySummary> = self
            .entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.user_id == user_id)
            .map(|e| HistorySummary {
                id: e.artifact.id,
                subject: e.subject.clone(),
                chapter_id: e.chapter_id.clone(),
                class_level: e.class_level.clone(),
                score: e.artifact.score,
                correct_count: e.artifact.correct_count,
                total_questions: e.artifact.total_questions,
                performance_label: e.artifact.performance_label,
                created_at: e.artifact.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn attach_analysis(
        &self,
        user_id: i64,
        artifact_id: Uuid,
        report: &str,
    ) -> Result<bool, AppError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(&artifact_id)
            .filter(|e| e.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("result not found".to_string()))?;

        if entry.artifact.ultra_analysis_report.is_some() {
            return Ok(false);
        }
        entry.artifact.ultra_analysis_report = Some(report.to_string());
        Ok(true)
    }
}

pub struct MemoryRewardConfig {
    rules: Mutex<Vec<PrizeRule>>,
    next_id: AtomicI64,
}

impl Default for MemoryRewardConfig {
    fn default() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryRewardConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RewardConfig for MemoryRewardConfig {
    async fn rules(&self) -> Result<Vec<PrizeRule>, AppError> {
        Ok(self.rules.lock().unwrap().clone())
    }

    async fn add_rule(
        &self,
        enabled: bool,
        category: String,
        min_questions: usize,
        min_percentage: f64,
        reward: Reward,
    ) -> Result<PrizeRule, AppError> {
        let rule = PrizeRule {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            enabled,
            category,
            min_questions,
            min_percentage,
            reward,
        };
        self.rules.lock().unwrap().push(rule.clone());
        Ok(rule)
    }
}

impl Stores {
    /// A full set of in-memory collaborators, for tests and local use.
    pub fn in_memory() -> Self {
        Self {
            content: Arc::new(MemoryContentProvider::new()),
            progress: Arc::new(MemoryProgressStore::new()),
            ledger: Arc::new(MemoryLedger::new()),
            history: Arc::new(MemoryResultHistory::new()),
            rewards: Arc::new(MemoryRewardConfig::new()),
        }
    }
}
