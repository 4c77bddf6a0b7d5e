// src/exam/view.rs

//! What the client is shown of a session.

use serde::Serialize;

use crate::{
    exam::{Phase, reconciler::SaveStatus, scoring, session::ExamSession},
    models::question::{PublicQuestion, Question},
};

/// The current question. Correctness, feedback and explanation are only
/// included once the attempt is complete.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QuestionView {
    Hidden(PublicQuestion),
    Revealed {
        #[serde(flatten)]
        question: Question,
        #[serde(rename = "answeredCorrectly")]
        answered_correctly: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub total_correct: usize,
    pub total_questions: usize,
    pub percentage: u32,
    pub correct: Vec<usize>,
    pub incorrect: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub exam: String,
    pub test_name: String,
    pub phase: Phase,
    pub attempt_id: Option<String>,
    pub total_questions: usize,
    pub current_index: usize,
    pub question: Option<QuestionView>,
    pub selection: Vec<String>,
    pub answered: Vec<usize>,
    pub saved: Vec<usize>,
    /// `None` for untimed exams.
    pub remaining_seconds: Option<u32>,
    pub report: Option<ReportView>,
    pub save_status: Option<SaveStatus>,
}

impl SessionView {
    pub fn build(
        session: &ExamSession,
        exam: &str,
        test_name: &str,
        timed: bool,
        save_status: Option<SaveStatus>,
    ) -> Self {
        let revealed = matches!(session.phase, Phase::Complete | Phase::Review);

        let question = session.current_question().map(|q| {
            if revealed {
                let committed = session
                    .answers
                    .get(&session.current_index)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                QuestionView::Revealed {
                    question: q.clone(),
                    answered_correctly: scoring::is_correct(q, committed),
                }
            } else {
                QuestionView::Hidden(PublicQuestion::from(q))
            }
        });

        let report = if revealed {
            session.report.as_ref().map(|r| ReportView {
                total_correct: r.total_correct,
                total_questions: session.questions.len(),
                percentage: scoring::percentage(r.total_correct, session.questions.len()),
                correct: r.correct.iter().copied().collect(),
                incorrect: r.incorrect.iter().copied().collect(),
            })
        } else {
            None
        };

        SessionView {
            exam: exam.to_string(),
            test_name: test_name.to_string(),
            phase: session.phase,
            attempt_id: session.attempt_id.clone(),
            total_questions: session.questions.len(),
            current_index: session.current_index,
            question,
            selection: session.selection.clone(),
            answered: session.answered.iter().copied().collect(),
            saved: session.saved.iter().copied().collect(),
            remaining_seconds: timed.then_some(session.remaining_seconds),
            report,
            save_status,
        }
    }
}
