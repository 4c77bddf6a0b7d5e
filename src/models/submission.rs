// src/models/submission.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Mock,
    Practice,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Mock => "mock",
            TestType::Practice => "practice",
        }
    }
}

/// Represents the 'test_logs' table: one row per completed attempt.
/// Written once at submission and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Attempt id; doubles as the idempotency key for remote writes.
    pub id: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub register_no: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    pub test_name: String,
    pub test_type: TestType,
    pub score: i32,
    pub total_questions: i32,
    pub questions_answered: i32,
    pub percentage: i32,
    #[serde(default)]
    pub time_spent: Option<String>,
    pub taken_at: DateTime<Utc>,
    /// Bank question id (stringified) -> selected answer ids.
    #[serde(default)]
    pub questions_map: Option<BTreeMap<String, Vec<String>>>,
    /// The questions exactly as the attempt presented them.
    #[serde(default)]
    pub questions_snapshot: Option<Vec<Question>>,
}

/// A history row without the heavy map/snapshot columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogSummary {
    pub id: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub register_no: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    pub test_name: String,
    pub test_type: TestType,
    pub score: i32,
    pub total_questions: i32,
    pub questions_answered: i32,
    pub percentage: i32,
    #[serde(default)]
    pub time_spent: Option<String>,
    pub taken_at: DateTime<Utc>,
}

impl From<SubmissionRecord> for TestLogSummary {
    fn from(r: SubmissionRecord) -> Self {
        TestLogSummary {
            id: r.id,
            user_id: r.user_id,
            register_no: r.register_no,
            student_name: r.student_name,
            test_name: r.test_name,
            test_type: r.test_type,
            score: r.score,
            total_questions: r.total_questions,
            questions_answered: r.questions_answered,
            percentage: r.percentage,
            time_spent: r.time_spent,
            taken_at: r.taken_at,
        }
    }
}

/// A student's record on one exam: the mock exam or a practice set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamStats {
    /// `mock` or the practice set id.
    pub key: String,
    pub name: String,
    pub attempts: usize,
    /// `None` until the exam has been taken.
    pub best_percentage: Option<i32>,
}

/// Query parameters for the admin results listing.
#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub test_type: Option<TestType>,
    pub test_name: Option<String>,
    pub limit: Option<usize>,
}
