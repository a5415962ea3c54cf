// src/stores/postgres.rs
//
// Postgres-backed implementations of the store contracts. All queries use
// the runtime API with explicit binds.

use async_trait::async_trait;
use sqlx::{PgPool, Row, types::Json};
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

pub struct PgContentProvider {
    pool: PgPool,
}

impl PgContentProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    question: String,
    options: Json<Vec<String>>,
    correct_answer: i32,
    explanation: Option<String>,
}

#[async_trait]
impl ContentProvider for PgContentProvider {
    async fn fetch_bank(&self, key: &ChapterKey) -> Result<Option<Vec<QuestionRecord>>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT question, options, correct_answer, explanation
            FROM questions
            WHERE board = $1 AND class_level = $2 AND stream = $3
              AND subject_name = $4 AND chapter_id = $5
            ORDER BY id
            "#,
        )
        .bind(&key.board)
        .bind(&key.class_level)
        .bind(&key.stream)
        .bind(&key.subject_name)
        .bind(&key.chapter_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            rows.into_iter()
                .map(|r| QuestionRecord {
                    question: r.question,
                    options: r.options.0,
                    correct_answer: r.correct_answer as usize,
                    explanation: r.explanation,
                })
                .collect(),
        ))
    }

    async fn put_bank(
        &self,
        key: &ChapterKey,
        questions: Vec<QuestionRecord>,
    ) -> Result<(), AppError> {
        // Replace the chapter's bank atomically.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM questions
            WHERE board = $1 AND class_level = $2 AND stream = $3
              AND subject_name = $4 AND chapter_id = $5
            "#,
        )
        .bind(&key.board)
        .bind(&key.class_level)
        .bind(&key.stream)
        .bind(&key.subject_name)
        .bind(&key.chapter_id)
        .execute(&mut *tx)
        .await?;

        for q in &questions {
            sqlx::query(
                r#"
                INSERT INTO questions
                    (board, class_level, stream, subject_name, chapter_id,
                     question, options, correct_answer, explanation)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&key.board)
            .bind(&key.class_level)
            .bind(&key.stream)
            .bind(&key.subject_name)
            .bind(&key.chapter_id)
            .bind(&q.question)
            .bind(Json(&q.options))
            .bind(q.correct_answer as i32)
            .bind(&q.explanation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "stored {} questions for chapter {}",
            questions.len(),
            key.chapter_id
        );
        Ok(())
    }
}

pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn get(&self, key: &str) -> Result<Option<SessionState>, AppError> {
        let state: Option<Json<SessionState>> =
            sqlx::query_scalar("SELECT state FROM session_progress WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(state.map(|s| s.0))
    }

    async fn set(&self, key: &str, state: &SessionState) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO session_progress (key, state, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET state = EXCLUDED.state, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(Json(state))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM session_progress WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    user_id: i64,
    balance: i64,
    auto_deduct: bool,
    sub_tier: Option<String>,
    sub_level: Option<i32>,
    sub_expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WalletRow {
    fn into_wallet(self) -> Wallet {
        let subscription = match (self.sub_tier, self.sub_level, self.sub_expires_at) {
            (Some(tier), Some(level), Some(expires_at)) => Some(Subscription {
                tier,
                level,
                expires_at,
            }),
            _ => None,
        };
        Wallet {
            user_id: self.user_id,
            balance: self.balance,
            auto_deduct: self.auto_deduct,
            subscription,
        }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn wallet(&self, user_id: i64) -> Result<Wallet, AppError> {
        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT user_id, balance, auto_deduct, sub_tier, sub_level, sub_expires_at FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_wallet())
    }

    async fn credit(&self, user_id: i64, amount: i64) -> Result<i64, AppError> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO wallets (user_id, balance) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET balance = wallets.balance + EXCLUDED.balance
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("credited {amount} to user {user_id} (balance {balance})");
        Ok(balance)
    }

    async fn debit(&self, user_id: i64, amount: i64) -> Result<i64, AppError> {
        // Single conditional update keeps the debit atomic: it simply does
        // not match when the balance is too low.
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE wallets SET balance = balance - $2 WHERE user_id = $1 AND balance >= $2 RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        match balance {
            Some(balance) => {
                tracing::info!("debited {amount} from user {user_id} (balance {balance})");
                Ok(balance)
            }
            None => {
                let wallet = self.wallet(user_id).await?;
                Err(AppError::InsufficientBalance {
                    cost: amount,
                    balance: wallet.balance,
                })
            }
        }
    }

    async fn set_auto_deduct(&self, user_id: i64, enabled: bool) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, auto_deduct) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET auto_deduct = EXCLUDED.auto_deduct
            "#,
        )
        .bind(user_id)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_subscription(&self, user_id: i64, sub: Subscription) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, sub_tier, sub_level, sub_expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
                SET sub_tier = EXCLUDED.sub_tier,
                    sub_level = EXCLUDED.sub_level,
                    sub_expires_at = EXCLUDED.sub_expires_at
            "#,
        )
        .bind(user_id)
        .bind(&sub.tier)
        .bind(sub.level)
        .bind(sub.expires_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "subscription '{}' (level {}) set for user {user_id} until {}",
            sub.tier,
            sub.level,
            sub.expires_at
        );
        Ok(())
    }
}

pub struct PgResultHistory {
    pool: PgPool,
}

impl PgResultHistory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultHistory for PgResultHistory {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), AppError> {
        // Keyed on the artifact's own id, so offline replay cannot duplicate
        // history rows.
        let result = sqlx::query(
            r#"
            INSERT INTO exam_results
                (id, user_id, subject, chapter_id, class_level, answers, artifact, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.artifact.id)
        .bind(entry.user_id)
        .bind(&entry.subject)
        .bind(&entry.chapter_id)
        .bind(&entry.class_level)
        .bind(Json(&entry.answers))
        .bind(Json(&entry.artifact))
        .bind(entry.artifact.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("artifact {} already durable, replay ignored", entry.artifact.id);
        }
        Ok(())
    }

    async fn get(
        &self,
        user_id: i64,
        artifact_id: Uuid,
    ) -> Result<Option<ResultArtifact>, AppError> {
        let artifact: Option<Json<ResultArtifact>> = sqlx::query_scalar(
            "SELECT artifact FROM exam_results WHERE id = $1 AND user_id = $2",
        )
        .bind(artifact_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(artifact.map(|a| a.0))
    }

    async fn list(&self, user_id: i64) -> Result<Vec<HistorySummary>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT subject, chapter_id, class_level, artifact
            FROM exam_results
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let artifact: Json<ResultArtifact> = row.try_get("artifact")?;
            let artifact = artifact.0;
            summaries.push(HistorySummary {
                id: artifact.id,
                subject: row.try_get("subject")?,
                chapter_id: row.try_get("chapter_id")?,
                class_level: row.try_get("class_level")?,
                score: artifact.score,
                correct_count: artifact.correct_count,
                total_questions: artifact.total_questions,
                performance_label: artifact.performance_label,
                created_at: artifact.created_at,
            });
        }
        Ok(summaries)
    }

    async fn attach_analysis(
        &self,
        user_id: i64,
        artifact_id: Uuid,
        report: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE exam_results
            SET artifact = jsonb_set(artifact, '{ultra_analysis_report}', to_jsonb($3::TEXT))
            WHERE id = $1 AND user_id = $2
              AND artifact->>'ultra_analysis_report' IS NULL
            "#,
        )
        .bind(artifact_id)
        .bind(user_id)
        .bind(report)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish "already attached" from "no such result".
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM exam_results WHERE id = $1 AND user_id = $2)",
        )
        .bind(artifact_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            Ok(false)
        } else {
            Err(AppError::NotFound("result not found".to_string()))
        }
    }
}

pub struct PgRewardConfig {
    pool: PgPool,
}

impl PgRewardConfig {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PrizeRuleRow {
    id: i64,
    enabled: bool,
    category: String,
    min_questions: i32,
    min_percentage: f64,
    reward_type: String,
    reward_amount: Option<i64>,
    reward_sub_tier: Option<String>,
    reward_sub_level: Option<i32>,
    reward_duration_hours: Option<i64>,
}

impl PrizeRuleRow {
    fn into_rule(self) -> PrizeRule {
        let reward = match self.reward_type.as_str() {
            "SUBSCRIPTION" => Reward::Subscription {
                tier: self.reward_sub_tier.unwrap_or_default(),
                level: self.reward_sub_level.unwrap_or(1),
                duration_hours: self.reward_duration_hours.unwrap_or(0),
            },
            _ => Reward::Coins {
                amount: self.reward_amount.unwrap_or(0),
            },
        };
        PrizeRule {
            id: self.id,
            enabled: self.enabled,
            category: self.category,
            min_questions: self.min_questions as usize,
            min_percentage: self.min_percentage,
            reward,
        }
    }
}

#[async_trait]
impl RewardConfig for PgRewardConfig {
    async fn rules(&self) -> Result<Vec<PrizeRule>, AppError> {
        let rows = sqlx::query_as::<_, PrizeRuleRow>(
            r#"
            SELECT id, enabled, category, min_questions, min_percentage,
                   reward_type, reward_amount, reward_sub_tier,
                   reward_sub_level, reward_duration_hours
            FROM prize_rules
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PrizeRuleRow::into_rule).collect())
    }

    async fn add_rule(
        &self,
        enabled: bool,
        category: String,
        min_questions: usize,
        min_percentage: f64,
        reward: Reward,
    ) -> Result<PrizeRule, AppError> {
        let (reward_type, amount, tier, level, hours) = match &reward {
            Reward::Coins { amount } => ("COINS", Some(*amount), None, None, None),
            Reward::Subscription {
                tier,
                level,
                duration_hours,
            } => (
                "SUBSCRIPTION",
                None,
                Some(tier.clone()),
                Some(*level),
                Some(*duration_hours),
            ),
        };

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO prize_rules
                (enabled, category, min_questions, min_percentage,
                 reward_type, reward_amount, reward_sub_tier,
                 reward_sub_level, reward_duration_hours)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(enabled)
        .bind(&category)
        .bind(min_questions as i32)
        .bind(min_percentage)
        .bind(reward_type)
        .bind(amount)
        .bind(tier)
        .bind(level)
        .bind(hours)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("prize rule {id} created for category '{category}'");
        Ok(PrizeRule {
            id,
            enabled,
            category,
            min_questions,
            min_percentage,
            reward,
        })
    }
}

impl Stores {
    /// Production wiring: every collaborator backed by the same pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            content: std::sync::Arc::new(PgContentProvider::new(pool.clone())),
            progress: std::sync::Arc::new(PgProgressStore::new(pool.clone())),
            ledger: std::sync::Arc::new(PgLedger::new(pool.clone())),
            history: std::sync::Arc::new(PgResultHistory::new(pool.clone())),
            rewards: std::sync::Arc::new(PgRewardConfig::new(pool)),
        }
    }
}
