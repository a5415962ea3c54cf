// src/models/question.rs

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::OPTIONS_PER_QUESTION;

/// Identity of one chapter's question bank as the content provider keys it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
pub struct ChapterKey {
    #[validate(length(min = 1, max = 50))]
    pub board: String,
    #[validate(length(min = 1, max = 20))]
    pub class_level: String,
    #[validate(length(min = 1, max = 50))]
    pub stream: String,
    #[validate(length(min = 1, max = 100))]
    pub subject_name: String,
    #[validate(length(min = 1, max = 100))]
    pub chapter_id: String,
}

/// A single MCQ record. Immutable once fetched; owned by the snapshot for
/// the duration of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,

    /// Exactly four options.
    pub options: Vec<String>,

    /// Index into `options` of the correct answer.
    pub correct_answer: usize,

    pub explanation: Option<String>,
}

/// DTO for sending a question to the client (excludes answer and explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    /// Index of the question within the shuffled snapshot.
    pub index: usize,
    pub question: String,
    pub options: Vec<String>,
}

impl PublicQuestion {
    pub fn from_record(index: usize, record: &QuestionRecord) -> Self {
        Self {
            index,
            question: record.question.clone(),
            options: record.options.clone(),
        }
    }
}

/// DTO for uploading a new question through the admin surface.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct NewQuestion {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[validate(length(max = 4000))]
    pub explanation: Option<String>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTIONS_PER_QUESTION {
        return Err(validator::ValidationError::new(
            "exactly_four_options_required",
        ));
    }
    for opt in options {
        if opt.is_empty() || opt.len() > 500 {
            return Err(validator::ValidationError::new("option_length_invalid"));
        }
    }
    Ok(())
}

impl NewQuestion {
    pub fn into_record(self) -> Result<QuestionRecord, validator::ValidationError> {
        if self.correct_answer >= OPTIONS_PER_QUESTION {
            return Err(validator::ValidationError::new(
                "correct_answer_out_of_range",
            ));
        }
        Ok(QuestionRecord {
            question: self.question,
            options: self.options,
            correct_answer: self.correct_answer,
            explanation: self.explanation,
        })
    }
}

/// Shuffles a fetched bank into the snapshot order for one attempt.
///
/// The seed is stored in the session state so a resumed session rebuilds the
/// identical snapshot, and tests can inject a fixed seed for determinism.
pub fn shuffle_questions(mut questions: Vec<QuestionRecord>, seed: u64) -> Vec<QuestionRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    questions.shuffle(&mut rng);
    questions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(n: usize) -> Vec<QuestionRecord> {
        (0..n)
            .map(|i| QuestionRecord {
                question: format!("Question {}", i),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_answer: i % 4,
                explanation: None,
            })
            .collect()
    }

    #[test]
    fn shuffle_is_deterministic_for_a_seed() {
        let a = shuffle_questions(bank(20), 42);
        let b = shuffle_questions(bank(20), 42);
        let qa: Vec<_> = a.iter().map(|q| q.question.clone()).collect();
        let qb: Vec<_> = b.iter().map(|q| q.question.clone()).collect();
        assert_eq!(qa, qb);
    }

    #[test]
    fn shuffle_keeps_every_question() {
        let shuffled = shuffle_questions(bank(20), 7);
        assert_eq!(shuffled.len(), 20);
        for i in 0..20 {
            assert!(
                shuffled
                    .iter()
                    .any(|q| q.question == format!("Question {}", i))
            );
        }
    }

    #[test]
    fn new_question_rejects_bad_answer_index() {
        let q = NewQuestion {
            question: "Q".into(),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: 4,
            explanation: None,
        };
        assert!(q.into_record().is_err());
    }
}
