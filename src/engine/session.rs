// src/engine/session.rs

use std::{collections::HashMap, sync::Mutex};

use serde::Serialize;

use crate::{
    config::CostTable,
    engine::{
        credits::{self, ActionClass, GateInput, GateOutcome},
        rewards::{self, GrantedReward},
        scoring,
    },
    error::AppError,
    models::{
        question::{ChapterKey, PublicQuestion, QuestionRecord, shuffle_questions},
        result::ResultArtifact,
        session::{Phase, SessionState},
    },
    stores::{HistoryEntry, Stores},
};

/// The authenticated caller, as the JWT middleware resolved it.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: i64,
    pub is_admin: bool,
}

/// One in-flight attempt: the mutable state plus its immutable snapshot.
struct ActiveSession {
    state: SessionState,
    bank: Vec<QuestionRecord>,
}

/// What the client sees of a session after any operation.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub phase: Phase,
    pub batch_index: usize,
    pub batch_count: usize,
    pub total_questions: usize,
    pub attempted_count: usize,
    pub elapsed_seconds: u64,
    pub can_go_next: bool,
    pub can_submit: bool,
    pub required_to_submit: usize,
    pub proctored: bool,
    /// The current batch, answers withheld.
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A prior in-progress session exists; the caller must pick `resume` or
    /// `restart`.
    ResumePrompt {
        attempted_count: usize,
        total_questions: usize,
        elapsed_seconds: u64,
    },
    /// The premium-test gate wants an explicit confirmation first.
    PaymentRequired { cost: i64, balance: i64 },
    Started { view: SessionView },
}

#[derive(Debug, Serialize)]
pub struct AnswerOutcome {
    /// False when the write-once rule, phase or index validation rejected
    /// the selection as a no-op.
    pub accepted: bool,
    pub attempted_count: usize,
    pub can_go_next: bool,
    pub can_submit: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitPrompt {
    pub attempted_count: usize,
    pub total_questions: usize,
    pub required_to_submit: usize,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub result: ResultArtifact,
    pub reward: Option<GrantedReward>,
    /// Set when the submission was forced by the anti-cheat rule.
    pub forced: bool,
}

/// Drives every attempt from `start` to `confirm_submit`.
///
/// The in-memory map is authoritative for active sessions; every mutation is
/// mirrored write-through into the Progress Store so an attempt survives a
/// process restart. A failed mirror write degrades (and is logged), it never
/// interrupts the session.
pub struct SessionEngine {
    sessions: Mutex<HashMap<String, ActiveSession>>,
    /// Finalized entries whose durable write failed, awaiting replay.
    pending_sync: Mutex<Vec<HistoryEntry>>,
    stores: Stores,
    costs: CostTable,
}

pub fn progress_key(user_id: i64, chapter_id: &str) -> String {
    format!("progress:{user_id}:{chapter_id}")
}

impl SessionEngine {
    pub fn new(stores: Stores, costs: CostTable) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            pending_sync: Mutex::new(Vec::new()),
            stores,
            costs,
        }
    }

    /// Starts (or re-enters) the attempt for one chapter.
    ///
    /// The Progress Store is read before any mutation: a prior non-empty
    /// record always surfaces as a resume prompt instead of being clobbered.
    pub async fn start(
        &self,
        caller: Caller,
        chapter: ChapterKey,
        category: Option<String>,
        proctored: bool,
        confirm: bool,
        enable_auto_deduct: bool,
    ) -> Result<StartOutcome, AppError> {
        let records = self.fetch_bank(&chapter).await?;
        let key = progress_key(caller.user_id, &chapter.chapter_id);

        let stored = match self.stores.progress.get(&key).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("progress read failed for {key}: {e}");
                None
            }
        };
        // Degraded path: if the mirror write had been failing, the in-memory
        // session is still the source of truth.
        let stored = stored.or_else(|| {
            self.sessions
                .lock()
                .unwrap()
                .get(&key)
                .filter(|s| !s.state.answers.is_empty() && s.state.phase != Phase::Submitted)
                .map(|s| s.state.clone())
        });

        if let Some(mut state) = stored.filter(|s| !s.answers.is_empty()) {
            // Hydration, not a runtime transition: the stored record re-enters
            // through the prompt regardless of the phase it was persisted in.
            state.phase = Phase::ResumePrompt;
            let bank = shuffle_questions(records, state.shuffle_seed);
            let prompt = StartOutcome::ResumePrompt {
                attempted_count: state.attempted_count(),
                total_questions: bank.len(),
                elapsed_seconds: state.elapsed_seconds,
            };
            self.sessions
                .lock()
                .unwrap()
                .insert(key, ActiveSession { state, bank });
            return Ok(prompt);
        }

        // Fresh attempt. A proctored ("premium test") start passes the credit
        // gate first; resuming a paid attempt never charges twice.
        if proctored {
            let gate = credits::authorize(
                self.stores.ledger.as_ref(),
                &self.costs,
                &ActionClass::PremiumTestStart,
                &GateInput {
                    user_id: caller.user_id,
                    is_admin: caller.is_admin,
                    confirm,
                    enable_auto_deduct,
                },
            )
            .await?;
            if let GateOutcome::ConfirmationRequired { cost, balance } = gate {
                return Ok(StartOutcome::PaymentRequired { cost, balance });
            }
        }

        let seed = rand::random::<u64>();
        let category = category.unwrap_or_else(|| chapter.subject_name.clone());
        let state = SessionState::new(chapter, category, proctored, seed);
        let bank = shuffle_questions(records, seed);
        let view = make_view(&state, &bank);

        self.sessions
            .lock()
            .unwrap()
            .insert(key, ActiveSession { state, bank });

        Ok(StartOutcome::Started { view })
    }

    /// Restores the stored attempt and returns to answering.
    pub async fn resume(&self, caller: Caller, chapter_id: &str) -> Result<SessionView, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let (state, view) = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            session.state.transition(Phase::Active)?;
            (session.state.clone(), make_view(&session.state, &session.bank))
        };
        self.mirror(&key, &state).await;
        Ok(view)
    }

    /// Discards the stored attempt, reshuffles the snapshot under a fresh
    /// seed and starts over. The store key is deleted outright.
    pub async fn restart(&self, caller: Caller, chapter_id: &str) -> Result<SessionView, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let chapter = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            if !session.state.phase.allows(Phase::Active) {
                return Err(AppError::InvalidPhase(format!(
                    "cannot restart from {:?}",
                    session.state.phase
                )));
            }
            session.state.chapter.clone()
        };

        if let Err(e) = self.stores.progress.remove(&key).await {
            tracing::warn!("progress delete failed for {key}: {e}");
        }

        let records = self.fetch_bank(&chapter).await?;
        let seed = rand::random::<u64>();

        let mut sessions = self.sessions.lock().unwrap();
        let session = active_entry(&mut sessions, &key)?;
        let (category, proctored) = (session.state.category.clone(), session.state.proctored);
        session.state = SessionState::new(chapter, category, proctored, seed);
        session.bank = shuffle_questions(records, seed);
        Ok(make_view(&session.state, &session.bank))
    }

    /// Records one answer selection. Invalid selections (wrong phase, bad
    /// index, already answered) are no-ops, never errors.
    pub async fn select_answer(
        &self,
        caller: Caller,
        chapter_id: &str,
        q_index: usize,
        option_index: usize,
    ) -> Result<AnswerOutcome, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let (accepted, state, outcome) = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            let total = session.bank.len();
            let accepted = session.state.select_answer(q_index, option_index, total);
            let outcome = AnswerOutcome {
                accepted,
                attempted_count: session.state.attempted_count(),
                can_go_next: session.state.can_go_next(total),
                can_submit: session.state.can_submit(total),
            };
            (accepted, session.state.clone(), outcome)
        };

        // Write-through on every mutation so an abrupt termination loses at
        // most the very last answer.
        if accepted {
            self.mirror(&key, &state).await;
        }
        Ok(outcome)
    }

    pub async fn next_batch(&self, caller: Caller, chapter_id: &str) -> Result<SessionView, AppError> {
        self.navigate(caller, chapter_id, true).await
    }

    pub async fn prev_batch(&self, caller: Caller, chapter_id: &str) -> Result<SessionView, AppError> {
        self.navigate(caller, chapter_id, false).await
    }

    async fn navigate(
        &self,
        caller: Caller,
        chapter_id: &str,
        forward: bool,
    ) -> Result<SessionView, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let (moved, state, view) = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            let total = session.bank.len();
            let moved = if forward {
                session.state.next_batch(total)
            } else {
                session.state.prev_batch()
            };
            (moved, session.state.clone(), make_view(&session.state, &session.bank))
        };

        if moved {
            self.mirror(&key, &state).await;
        }
        Ok(view)
    }

    /// One elapsed second. Ticks outside the `Active` phase are absorbed.
    pub async fn tick(&self, caller: Caller, chapter_id: &str) -> Result<u64, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let state = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            session.state.tick();
            session.state.clone()
        };
        self.mirror(&key, &state).await;
        Ok(state.elapsed_seconds)
    }

    /// `Active -> SubmitConfirm`, surfacing attempted vs. total counts.
    pub async fn request_submit(
        &self,
        caller: Caller,
        chapter_id: &str,
    ) -> Result<SubmitPrompt, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let (state, prompt) = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            let total = session.bank.len();
            if !session.state.can_submit(total) {
                return Err(AppError::BadRequest(format!(
                    "answer at least {} questions before submitting ({} so far)",
                    SessionState::required_to_submit(total),
                    session.state.attempted_count()
                )));
            }
            session.state.transition(Phase::SubmitConfirm)?;
            let prompt = SubmitPrompt {
                attempted_count: session.state.attempted_count(),
                total_questions: total,
                required_to_submit: SessionState::required_to_submit(total),
            };
            (session.state.clone(), prompt)
        };
        self.mirror(&key, &state).await;
        Ok(prompt)
    }

    /// `SubmitConfirm -> Active`, the student went back to the questions.
    pub async fn cancel_submit(
        &self,
        caller: Caller,
        chapter_id: &str,
    ) -> Result<SessionView, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let (state, view) = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            if session.state.phase != Phase::SubmitConfirm {
                return Err(AppError::InvalidPhase(
                    "no submission to cancel".to_string(),
                ));
            }
            session.state.transition(Phase::Active)?;
            (session.state.clone(), make_view(&session.state, &session.bank))
        };
        self.mirror(&key, &state).await;
        Ok(view)
    }

    /// Finalizes the attempt: grade, clear the store entry, evaluate prize
    /// rules and sync the artifact. The user-visible transition cannot fail
    /// once the phase change is accepted.
    pub async fn confirm_submit(
        &self,
        caller: Caller,
        chapter_id: &str,
    ) -> Result<SubmitOutcome, AppError> {
        self.finalize(caller, chapter_id, false).await
    }

    /// Anti-cheat trigger: loss of foreground focus during a proctored
    /// attempt force-submits whatever was attempted. One-shot; anything else
    /// (non-proctored session, wrong phase, no session) is a no-op.
    pub async fn report_violation(
        &self,
        caller: Caller,
        chapter_id: &str,
    ) -> Result<Option<SubmitOutcome>, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        if self.ensure_loaded(&key).await.is_err() {
            return Ok(None);
        }
        {
            let sessions = self.sessions.lock().unwrap();
            let Some(session) = sessions.get(&key) else {
                return Ok(None);
            };
            if !session.state.proctored || session.state.phase != Phase::Active {
                return Ok(None);
            }
        }
        let outcome = self.finalize(caller, chapter_id, true).await?;
        Ok(Some(outcome))
    }

    async fn finalize(
        &self,
        caller: Caller,
        chapter_id: &str,
        forced: bool,
    ) -> Result<SubmitOutcome, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;

        let (state, bank) = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = active_entry(&mut sessions, &key)?;
            match (forced, session.state.phase) {
                (false, Phase::SubmitConfirm) | (true, Phase::Active) => {}
                (false, phase) => {
                    return Err(AppError::InvalidPhase(format!(
                        "cannot submit from {:?}",
                        phase
                    )));
                }
                (true, phase) => {
                    return Err(AppError::InvalidPhase(format!(
                        "cannot force-submit from {:?}",
                        phase
                    )));
                }
            }
            session.state.transition(Phase::Submitted)?;
            let session = sessions.remove(&key).expect("entry checked above");
            (session.state, session.bank)
        };

        let artifact = scoring::grade(&state.answers, &bank, state.elapsed_seconds);
        tracing::info!(
            "session {key} submitted{}: {}/{} correct in {}s",
            if forced { " (forced)" } else { "" },
            artifact.correct_count,
            artifact.total_questions,
            artifact.total_time_seconds
        );

        if let Err(e) = self.stores.progress.remove(&key).await {
            tracing::warn!("progress delete failed for {key}: {e}");
        }

        let reward = self.evaluate_reward(caller.user_id, &state, &artifact).await;

        let entry = HistoryEntry {
            user_id: caller.user_id,
            subject: state.chapter.subject_name.clone(),
            chapter_id: state.chapter.chapter_id.clone(),
            class_level: state.chapter.class_level.clone(),
            answers: state.answers.clone(),
            artifact: artifact.clone(),
        };
        self.record_or_queue(entry).await;

        Ok(SubmitOutcome {
            result: artifact,
            reward,
            forced,
        })
    }

    async fn evaluate_reward(
        &self,
        user_id: i64,
        state: &SessionState,
        artifact: &ResultArtifact,
    ) -> Option<GrantedReward> {
        let rules = match self.stores.rewards.rules().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("prize rules unavailable: {e}");
                return None;
            }
        };
        let rule = rewards::select_rule(
            &rules,
            &state.category,
            artifact.total_questions,
            artifact.score,
        )?;
        match rewards::apply_reward(self.stores.ledger.as_ref(), user_id, rule).await {
            Ok(granted) => Some(granted),
            Err(e) => {
                tracing::error!("failed to apply prize rule {}: {e}", rule.id);
                None
            }
        }
    }

    /// Best-effort durable sync: a failed write queues the entry for replay
    /// instead of failing the submission.
    async fn record_or_queue(&self, entry: HistoryEntry) {
        match self.stores.history.record(&entry).await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(
                    "history sync failed for artifact {}, queued for replay: {e}",
                    entry.artifact.id
                );
                self.pending_sync.lock().unwrap().push(entry);
            }
        }
    }

    /// Replays queued artifacts. Safe to call repeatedly: the durable store
    /// is idempotent on the artifact id.
    pub async fn flush_pending_sync(&self) -> usize {
        let pending: Vec<HistoryEntry> = self.pending_sync.lock().unwrap().drain(..).collect();
        let mut replayed = 0;
        for entry in pending {
            match self.stores.history.record(&entry).await {
                Ok(()) => replayed += 1,
                Err(e) => {
                    tracing::warn!("replay failed for artifact {}: {e}", entry.artifact.id);
                    self.pending_sync.lock().unwrap().push(entry);
                }
            }
        }
        replayed
    }

    pub fn pending_sync_len(&self) -> usize {
        self.pending_sync.lock().unwrap().len()
    }

    /// Current view of the session (used after reloads).
    pub async fn view(&self, caller: Caller, chapter_id: &str) -> Result<SessionView, AppError> {
        let key = progress_key(caller.user_id, chapter_id);
        self.ensure_loaded(&key).await?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = active_entry(&mut sessions, &key)?;
        Ok(make_view(&session.state, &session.bank))
    }

    async fn fetch_bank(&self, chapter: &ChapterKey) -> Result<Vec<QuestionRecord>, AppError> {
        let records = self.stores.content.fetch_bank(chapter).await?;
        match records {
            Some(records) if !records.is_empty() => Ok(records),
            _ => Err(AppError::ContentUnavailable(format!(
                "questions for chapter '{}' are coming soon",
                chapter.chapter_id
            ))),
        }
    }

    /// Rehydrates a session from the Progress Store after a process restart;
    /// the stored seed rebuilds the identical snapshot.
    async fn ensure_loaded(&self, key: &str) -> Result<(), AppError> {
        if self.sessions.lock().unwrap().contains_key(key) {
            return Ok(());
        }
        let stored = match self.stores.progress.get(key).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("progress read failed for {key}: {e}");
                None
            }
        };
        let Some(state) = stored else {
            return Err(AppError::NotFound("no session in progress".to_string()));
        };
        let records = self.fetch_bank(&state.chapter).await?;
        let bank = shuffle_questions(records, state.shuffle_seed);
        self.sessions
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(ActiveSession { state, bank });
        Ok(())
    }

    async fn mirror(&self, key: &str, state: &SessionState) {
        if let Err(e) = self.stores.progress.set(key, state).await {
            tracing::warn!(
                "progress write failed for {key}, in-memory session remains authoritative: {e}"
            );
        }
    }
}

fn active_entry<'a>(
    sessions: &'a mut HashMap<String, ActiveSession>,
    key: &str,
) -> Result<&'a mut ActiveSession, AppError> {
    sessions
        .get_mut(key)
        .ok_or_else(|| AppError::NotFound("no session in progress".to_string()))
}

fn make_view(state: &SessionState, bank: &[QuestionRecord]) -> SessionView {
    let total = bank.len();
    let questions = state
        .batch_range(total)
        .map(|i| PublicQuestion::from_record(i, &bank[i]))
        .collect();
    SessionView {
        phase: state.phase,
        batch_index: state.batch_index,
        batch_count: SessionState::batch_count(total),
        total_questions: total,
        attempted_count: state.attempted_count(),
        elapsed_seconds: state.elapsed_seconds,
        can_go_next: state.can_go_next(total),
        can_submit: state.can_submit(total),
        required_to_submit: SessionState::required_to_submit(total),
        proctored: state.proctored,
        questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostTable;
    use crate::models::question::QuestionRecord;
    use crate::stores::Stores;

    fn chapter() -> ChapterKey {
        ChapterKey {
            board: "cbse".into(),
            class_level: "10".into(),
            stream: "science".into(),
            subject_name: "physics".into(),
            chapter_id: "optics".into(),
        }
    }

    fn caller() -> Caller {
        Caller {
            user_id: 1,
            is_admin: false,
        }
    }

    async fn engine_with_bank(n: usize) -> SessionEngine {
        let stores = Stores::in_memory();
        let bank: Vec<QuestionRecord> = (0..n)
            .map(|i| QuestionRecord {
                question: format!("Question {}", i),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_answer: 0,
                explanation: None,
            })
            .collect();
        stores.content.put_bank(&chapter(), bank).await.unwrap();
        SessionEngine::new(stores, CostTable::default())
    }

    #[tokio::test]
    async fn missing_bank_is_coming_soon() {
        let engine = SessionEngine::new(Stores::in_memory(), CostTable::default());
        let result = engine
            .start(caller(), chapter(), None, false, false, false)
            .await;
        assert!(matches!(result, Err(AppError::ContentUnavailable(_))));
    }

    #[tokio::test]
    async fn fresh_start_goes_straight_to_active() {
        let engine = engine_with_bank(40).await;
        let outcome = engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        match outcome {
            StartOutcome::Started { view } => {
                assert_eq!(view.phase, Phase::Active);
                assert_eq!(view.total_questions, 40);
                assert_eq!(view.questions.len(), 10);
                assert_eq!(view.required_to_submit, 30);
            }
            other => panic!("expected Started, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn start_with_stored_answers_prompts_and_is_idempotent() {
        let engine = engine_with_bank(40).await;
        engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        for i in 0..5 {
            engine
                .select_answer(caller(), "optics", i, 1)
                .await
                .unwrap();
        }

        // Re-entry surfaces the prompt; doing it twice reads the same stored
        // record and yields the same state both times.
        let first = engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        let second = engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        for outcome in [first, second] {
            match outcome {
                StartOutcome::ResumePrompt {
                    attempted_count,
                    total_questions,
                    ..
                } => {
                    assert_eq!(attempted_count, 5);
                    assert_eq!(total_questions, 40);
                }
                other => panic!("expected ResumePrompt, got {:?}", other),
            }
        }

        let view = engine.resume(caller(), "optics").await.unwrap();
        assert_eq!(view.phase, Phase::Active);
        assert_eq!(view.attempted_count, 5);
    }

    #[tokio::test]
    async fn restart_discards_answers_and_reshuffles() {
        let engine = engine_with_bank(40).await;
        engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        for i in 0..5 {
            engine
                .select_answer(caller(), "optics", i, 1)
                .await
                .unwrap();
        }

        let view = engine.restart(caller(), "optics").await.unwrap();
        assert_eq!(view.attempted_count, 0);
        assert_eq!(view.phase, Phase::Active);

        // The stored record is gone: a fresh start skips the prompt.
        let outcome = engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));
    }

    #[tokio::test]
    async fn submit_flow_produces_artifact_of_attempted_only() {
        let engine = engine_with_bank(40).await;
        engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        for i in 0..30 {
            engine
                .select_answer(caller(), "optics", i, 0)
                .await
                .unwrap();
        }

        let prompt = engine.request_submit(caller(), "optics").await.unwrap();
        assert_eq!(prompt.attempted_count, 30);
        assert_eq!(prompt.total_questions, 40);

        let outcome = engine.confirm_submit(caller(), "optics").await.unwrap();
        assert_eq!(outcome.result.total_questions, 30);
        assert_eq!(outcome.result.omr_data.len(), 30);
        assert!(!outcome.forced);

        // Attempt is gone from both the map and the store.
        assert!(engine.view(caller(), "optics").await.is_err());
        let history = engine.stores.history.list(1).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn early_submit_is_rejected() {
        let engine = engine_with_bank(40).await;
        engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        for i in 0..10 {
            engine
                .select_answer(caller(), "optics", i, 0)
                .await
                .unwrap();
        }
        assert!(matches!(
            engine.request_submit(caller(), "optics").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn violation_force_submits_proctored_attempt() {
        let engine = engine_with_bank(40).await;
        // Give the caller enough balance for the premium start, confirmed.
        engine.stores.ledger.credit(1, 100).await.unwrap();
        let outcome = engine
            .start(caller(), chapter(), None, true, true, false)
            .await
            .unwrap();
        assert!(matches!(outcome, StartOutcome::Started { .. }));

        for i in 0..12 {
            engine
                .select_answer(caller(), "optics", i, 0)
                .await
                .unwrap();
        }

        let outcome = engine
            .report_violation(caller(), "optics")
            .await
            .unwrap()
            .expect("violation should force-submit");
        assert!(outcome.forced);
        assert_eq!(outcome.result.total_questions, 12);

        // One-shot: a second report is a no-op.
        assert!(
            engine
                .report_violation(caller(), "optics")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn violation_on_unproctored_attempt_is_a_noop() {
        let engine = engine_with_bank(40).await;
        engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        engine.select_answer(caller(), "optics", 0, 0).await.unwrap();
        assert!(
            engine
                .report_violation(caller(), "optics")
                .await
                .unwrap()
                .is_none()
        );
        // Still answering.
        let view = engine.view(caller(), "optics").await.unwrap();
        assert_eq!(view.phase, Phase::Active);
    }

    #[tokio::test]
    async fn session_survives_engine_restart_via_progress_store() {
        let stores = Stores::in_memory();
        let bank: Vec<QuestionRecord> = (0..40)
            .map(|i| QuestionRecord {
                question: format!("Question {}", i),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_answer: 0,
                explanation: None,
            })
            .collect();
        stores.content.put_bank(&chapter(), bank).await.unwrap();

        let engine = SessionEngine::new(stores.clone(), CostTable::default());
        engine
            .start(caller(), chapter(), None, false, false, false)
            .await
            .unwrap();
        let first_view = {
            for i in 0..3 {
                engine
                    .select_answer(caller(), "optics", i, 2)
                    .await
                    .unwrap();
            }
            engine.view(caller(), "optics").await.unwrap()
        };

        // New engine over the same stores: rehydrates state and the same
        // shuffled snapshot from the stored seed.
        let rebooted = SessionEngine::new(stores, CostTable::default());
        let view = rebooted.view(caller(), "optics").await.unwrap();
        assert_eq!(view.attempted_count, 3);
        assert_eq!(
            view.questions.first().map(|q| q.question.clone()),
            first_view.questions.first().map(|q| q.question.clone())
        );
    }
}
