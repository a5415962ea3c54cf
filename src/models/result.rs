// src/models/result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speed classification, derived from the average time per question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceTag {
    Excellent,
    Good,
    Bad,
    VeryBad,
}

impl PerformanceTag {
    pub fn from_average_seconds(avg: f64) -> Self {
        if avg <= 15.0 {
            PerformanceTag::Excellent
        } else if avg <= 30.0 {
            PerformanceTag::Good
        } else if avg <= 45.0 {
            PerformanceTag::Bad
        } else {
            PerformanceTag::VeryBad
        }
    }
}

/// Accuracy classification, derived from the score percentage.
///
/// Kept alongside `PerformanceTag` without reconciliation: one answers "how
/// fast", the other "how accurate".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceLabel {
    Excellent,
    Good,
    Average,
    Bad,
}

impl PerformanceLabel {
    pub fn from_percentage(pct: f64) -> Self {
        if pct >= 90.0 {
            PerformanceLabel::Excellent
        } else if pct >= 75.0 {
            PerformanceLabel::Good
        } else if pct >= 50.0 {
            PerformanceLabel::Average
        } else {
            PerformanceLabel::Bad
        }
    }
}

/// One row of the OMR-style answer grid: selected vs. correct option for a
/// submitted question. `selected` is `-1` when no selection survived the
/// remap (defensive; submitted questions are attempted by construction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmrEntry {
    pub q_index: usize,
    pub selected: i32,
    pub correct: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrongQuestion {
    pub question: String,
    pub q_index: usize,
}

/// The persisted, shareable outcome record of one completed attempt.
///
/// Immutable after creation except for `ultra_analysis_report`, which is
/// written at most once (later unlock attempts return the cached report).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub id: Uuid,

    /// Count of attempted questions only; unattempted questions never enter
    /// the artifact.
    pub total_questions: usize,
    pub correct_count: usize,
    pub wrong_count: usize,

    /// Accuracy percentage over attempted questions.
    pub score: f64,

    pub total_time_seconds: u64,
    pub average_time_per_question: f64,

    pub performance_tag: PerformanceTag,
    pub performance_label: PerformanceLabel,

    pub omr_data: Vec<OmrEntry>,
    pub wrong_questions: Vec<WrongQuestion>,

    pub ultra_analysis_report: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Denormalized row for the history feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: Uuid,
    pub subject: String,
    pub chapter_id: String,
    pub class_level: String,
    pub score: f64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub performance_label: PerformanceLabel,
    pub created_at: DateTime<Utc>,
}
