// src/models/session.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::{BATCH_SIZE, MIN_REQUIRED_TO_SUBMIT, OPTIONS_PER_QUESTION},
    error::AppError,
    models::question::ChapterKey,
};

/// Original question index -> selected option index.
///
/// Grows monotonically during an attempt; cleared only by restart. Absence of
/// a key means "unattempted". `BTreeMap` keeps iteration in ascending index
/// order, which the scoring remap relies on.
pub type AnswerMap = BTreeMap<usize, usize>;

/// Explicit session lifecycle. Legal transitions are validated centrally in
/// `Phase::allows`, never inferred from combinations of flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Loading,
    ResumePrompt,
    Active,
    SubmitConfirm,
    Submitted,
}

impl Phase {
    /// `Active -> Active` is restart. `Active -> Submitted` is the anti-cheat
    /// force-termination; the regular path goes through `SubmitConfirm`.
    pub fn allows(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Loading, ResumePrompt)
                | (Loading, Active)
                | (ResumePrompt, Active)
                | (Active, Active)
                | (Active, SubmitConfirm)
                | (Active, Submitted)
                | (SubmitConfirm, Active)
                | (SubmitConfirm, Submitted)
        )
    }
}

/// The per-attempt state persisted whole into the Progress Store on every
/// mutation. The question snapshot itself is not stored; it is rebuilt from
/// the content provider and `shuffle_seed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub chapter: ChapterKey,
    /// Category used for prize-rule matching (defaults to the subject name).
    pub category: String,
    pub answers: AnswerMap,
    pub batch_index: usize,
    pub elapsed_seconds: u64,
    pub phase: Phase,
    pub shuffle_seed: u64,
    /// Proctored attempts are force-submitted on loss of foreground focus.
    pub proctored: bool,
}

impl SessionState {
    pub fn new(chapter: ChapterKey, category: String, proctored: bool, shuffle_seed: u64) -> Self {
        Self {
            chapter,
            category,
            answers: AnswerMap::new(),
            batch_index: 0,
            elapsed_seconds: 0,
            phase: Phase::Active,
            shuffle_seed,
            proctored,
        }
    }

    pub fn transition(&mut self, next: Phase) -> Result<(), AppError> {
        if !self.phase.allows(next) {
            return Err(AppError::InvalidPhase(format!(
                "illegal phase transition {:?} -> {:?}",
                self.phase, next
            )));
        }
        self.phase = next;
        Ok(())
    }

    /// Records an answer. Write-once: re-selecting an already-answered
    /// question is a no-op. Out-of-range indices and mutations outside the
    /// `Active` phase are likewise rejected as no-ops so a misbehaving client
    /// can never corrupt the map. Returns whether the map changed.
    pub fn select_answer(&mut self, q_index: usize, option_index: usize, total: usize) -> bool {
        if self.phase != Phase::Active {
            tracing::debug!("answer ignored: phase is {:?}", self.phase);
            return false;
        }
        if q_index >= total || option_index >= OPTIONS_PER_QUESTION {
            tracing::debug!("answer ignored: index out of range ({q_index}, {option_index})");
            return false;
        }
        if self.answers.contains_key(&q_index) {
            return false;
        }
        self.answers.insert(q_index, option_index);
        true
    }

    pub fn attempted_count(&self) -> usize {
        self.answers.len()
    }

    pub fn required_to_submit(total: usize) -> usize {
        MIN_REQUIRED_TO_SUBMIT.min(total)
    }

    pub fn can_submit(&self, total: usize) -> bool {
        self.attempted_count() >= Self::required_to_submit(total)
    }

    pub fn batch_count(total: usize) -> usize {
        total.div_ceil(BATCH_SIZE)
    }

    /// Snapshot index range of the current batch.
    pub fn batch_range(&self, total: usize) -> std::ops::Range<usize> {
        let start = (self.batch_index * BATCH_SIZE).min(total);
        let end = (start + BATCH_SIZE).min(total);
        start..end
    }

    pub fn batch_answered(&self, total: usize) -> bool {
        self.batch_range(total).all(|i| self.answers.contains_key(&i))
    }

    /// Forward navigation requires the current batch to be fully answered;
    /// this enforces sequential completion rather than free browsing.
    pub fn can_go_next(&self, total: usize) -> bool {
        self.batch_index + 1 < Self::batch_count(total) && self.batch_answered(total)
    }

    pub fn next_batch(&mut self, total: usize) -> bool {
        if self.phase == Phase::Active && self.can_go_next(total) {
            self.batch_index += 1;
            return true;
        }
        false
    }

    /// Backward navigation is unrestricted (review only).
    pub fn prev_batch(&mut self) -> bool {
        if self.phase == Phase::Active && self.batch_index > 0 {
            self.batch_index -= 1;
            return true;
        }
        false
    }

    /// One-second cadence. Suspended outside `Active` so dialog time never
    /// counts against the student.
    pub fn tick(&mut self) {
        if self.phase == Phase::Active {
            self.elapsed_seconds += 1;
        }
    }
}
