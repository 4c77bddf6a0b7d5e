// src/models/question.rs

use serde::{Deserialize, Serialize};

/// How many answers a question expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    /// Exactly one correct answer; a new selection replaces the previous one.
    #[serde(rename = "multiple-choice")]
    SingleSelect,
    /// Any number of correct answers; selecting toggles membership.
    #[serde(rename = "multi-select")]
    MultiSelect,
}

impl QuestionType {
    /// Maps the bank's `assessment_type` string.
    pub fn from_bank(raw: &str) -> Option<Self> {
        match raw {
            "multiple-choice" => Some(QuestionType::SingleSelect),
            "multi-select" => Some(QuestionType::MultiSelect),
            _ => None,
        }
    }
}

/// One answer option of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Single lowercase letter assigned from the answer's position in the bank,
    /// never from its shuffled display position.
    pub id: String,
    pub text: String,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
    #[serde(default)]
    pub feedback: String,
}

/// A question as it lives inside an exam session (and inside a stored snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable numeric id from the question bank.
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(rename = "question")]
    pub prompt_html: String,
    pub answers: Vec<Answer>,
    #[serde(rename = "explanation", default)]
    pub explanation_html: String,
    #[serde(default)]
    pub section: String,
    #[serde(rename = "links", default)]
    pub reference_links: Vec<String>,
    #[serde(rename = "setName", default)]
    pub source_set: String,
}

impl Question {
    /// Ids of the answers marked correct, sorted.
    pub fn correct_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .answers
            .iter()
            .filter(|a| a.is_correct)
            .map(|a| a.id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn has_answer(&self, answer_id: &str) -> bool {
        self.answers.iter().any(|a| a.id == answer_id)
    }
}

/// DTO for sending a question to the client while an attempt is running
/// (no correctness, feedback or explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    pub answers: Vec<PublicAnswer>,
    pub section: String,
}

#[derive(Debug, Serialize)]
pub struct PublicAnswer {
    pub id: String,
    pub text: String,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            question: q.prompt_html.clone(),
            answers: q
                .answers
                .iter()
                .map(|a| PublicAnswer {
                    id: a.id.clone(),
                    text: a.text.clone(),
                })
                .collect(),
            section: q.section.clone(),
        }
    }
}

/// One question-bank file: `{ "results": [ ... ] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BankFile {
    #[serde(default)]
    pub results: Vec<BankQuestion>,
}

/// A raw question-bank record, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct BankQuestion {
    pub id: i64,
    pub assessment_type: String,
    pub prompt: BankPrompt,
    /// Canonical correct answer ids, e.g. `["a", "c"]`.
    #[serde(default)]
    pub correct_response: Vec<String>,
    #[serde(default)]
    pub section: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankPrompt {
    pub question: String,
    pub answers: Vec<String>,
    #[serde(default)]
    pub feedbacks: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub links: Option<Vec<String>>,
}
