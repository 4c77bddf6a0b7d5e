// src/exam/scoring.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::question::Question;

/// Committed answers: question position -> selected answer ids.
pub type AnswerMap = BTreeMap<usize, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub total_correct: usize,
    /// Positions whose committed answer matched exactly.
    pub correct: BTreeSet<usize>,
    /// Positions with a committed answer that did not match.
    pub incorrect: BTreeSet<usize>,
}

/// True when `selected` holds exactly the correct ids, in any order.
pub fn is_correct(question: &Question, selected: &[String]) -> bool {
    let expected = question.correct_ids();
    if selected.len() != expected.len() {
        return false;
    }
    let mut given: Vec<&str> = selected.iter().map(String::as_str).collect();
    given.sort_unstable();
    given == expected
}

/// Scores every committed answer. Positions without one are in neither set
/// and contribute nothing to the total.
pub fn score(questions: &[Question], answers: &AnswerMap) -> ScoreReport {
    let mut report = ScoreReport::default();
    for (index, question) in questions.iter().enumerate() {
        let Some(selected) = answers.get(&index) else {
            continue;
        };
        if is_correct(question, selected) {
            report.total_correct += 1;
            report.correct.insert(index);
        } else {
            report.incorrect.insert(index);
        }
    }
    report
}

/// `round(100 * correct / total)`, halves rounded up; 0 for an empty exam.
pub fn percentage(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((200 * correct + total) / (2 * total)) as u32
}
