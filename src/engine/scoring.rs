// src/engine/scoring.rs

use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    question::QuestionRecord,
    result::{OmrEntry, PerformanceLabel, PerformanceTag, ResultArtifact, WrongQuestion},
    session::AnswerMap,
};

/// Grades one attempt: filters to attempted questions only, remaps their
/// indices to a dense `0..k` range, and derives counts, timing analytics and
/// both performance classifications.
///
/// Pure over its inputs; the artifact id and timestamp are stamped here.
pub fn grade(answers: &AnswerMap, bank: &[QuestionRecord], elapsed_seconds: u64) -> ResultArtifact {
    // Attempted original indices, ascending. BTreeMap iteration is already
    // sorted; the order fixes the OMR grid and wrong-list ordering.
    let attempted: Vec<usize> = answers.keys().copied().filter(|&i| i < bank.len()).collect();
    let k = attempted.len();

    let mut correct_count = 0;
    let mut omr_data = Vec::with_capacity(k);
    let mut wrong_questions = Vec::new();

    for (new_idx, &old_idx) in attempted.iter().enumerate() {
        let record = &bank[old_idx];
        let selected = answers
            .get(&old_idx)
            .map(|&s| s as i32)
            .unwrap_or(-1);

        if selected == record.correct_answer as i32 {
            correct_count += 1;
        } else if selected != -1 {
            // Only attempted-and-incorrect entries; an unattempted question
            // is never classified as wrong.
            wrong_questions.push(WrongQuestion {
                question: record.question.clone(),
                q_index: new_idx,
            });
        }

        omr_data.push(OmrEntry {
            q_index: new_idx,
            selected,
            correct: record.correct_answer,
        });
    }

    let wrong_count = k - correct_count;

    // Guard the k = 0 case so percentages stay 0 instead of NaN.
    let score = if k == 0 {
        0.0
    } else {
        (correct_count as f64 / k as f64) * 100.0
    };
    let average_time_per_question = if k == 0 {
        0.0
    } else {
        elapsed_seconds as f64 / k as f64
    };

    ResultArtifact {
        id: Uuid::new_v4(),
        total_questions: k,
        correct_count,
        wrong_count,
        score,
        total_time_seconds: elapsed_seconds,
        average_time_per_question,
        performance_tag: PerformanceTag::from_average_seconds(average_time_per_question),
        performance_label: PerformanceLabel::from_percentage(score),
        omr_data,
        wrong_questions,
        ultra_analysis_report: None,
        created_at: Utc::now(),
    }
}

/// The dense subset of the snapshot covered by an artifact, in the same
/// order as its OMR grid. Used when the full question text is needed again
/// (deep-analysis composition).
pub fn submitted_questions<'a>(
    answers: &AnswerMap,
    bank: &'a [QuestionRecord],
) -> Vec<&'a QuestionRecord> {
    answers
        .keys()
        .copied()
        .filter(|&i| i < bank.len())
        .map(|i| &bank[i])
        .collect()
}

/// Composes the deep-analysis report text from a graded artifact.
///
/// The report is derived data: summary figures plus a digest of every wrong
/// answer. It is attached to the artifact at most once.
pub fn compose_analysis(artifact: &ResultArtifact) -> String {
    let mut report = String::new();

    report.push_str(&format!(
        "Attempted {} questions: {} correct, {} wrong ({:.1}%).\n",
        artifact.total_questions, artifact.correct_count, artifact.wrong_count, artifact.score
    ));
    report.push_str(&format!(
        "Total time {}s, {:.1}s per question ({:?} pace, {:?} accuracy).\n",
        artifact.total_time_seconds,
        artifact.average_time_per_question,
        artifact.performance_tag,
        artifact.performance_label
    ));

    if artifact.wrong_questions.is_empty() {
        report.push_str("No incorrect answers. Nothing to revise.\n");
    } else {
        report.push_str(&format!(
            "Revise these {} questions:\n",
            artifact.wrong_questions.len()
        ));
        for wrong in &artifact.wrong_questions {
            report.push_str(&format!("  Q{}: {}\n", wrong.q_index + 1, wrong.question));
        }
    }

    report
}
