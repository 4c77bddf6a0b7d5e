// src/exam/mod.rs

pub mod hub;
pub mod normalizer;
pub mod reconciler;
pub mod repository;
pub mod review;
pub mod scoring;
pub mod session;
pub mod view;

use serde::{Deserialize, Serialize};

use crate::{config::Config, models::submission::TestType, store::StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    NotStarted,
    InProgress,
    Complete,
    Review,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::NotStarted => "not-started",
            Phase::InProgress => "in-progress",
            Phase::Complete => "complete",
            Phase::Review => "review",
        };
        f.write_str(name)
    }
}

/// Which exam a session belongs to: the pooled mock or one practice set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExamKind {
    Mock,
    Practice(String),
}

impl ExamKind {
    /// `mock`, or the name of a configured question set.
    pub fn parse(raw: &str, config: &Config) -> Result<Self, ExamError> {
        if raw == "mock" {
            return Ok(ExamKind::Mock);
        }
        if config.question_sets.iter().any(|s| s == raw) {
            return Ok(ExamKind::Practice(raw.to_string()));
        }
        Err(ExamError::UnknownExam(raw.to_string()))
    }

    /// Identifier used in URLs: `mock` or the set name.
    pub fn id(&self) -> &str {
        match self {
            ExamKind::Mock => "mock",
            ExamKind::Practice(set) => set,
        }
    }

    /// Cache namespace segment for this exam.
    pub fn key(&self) -> String {
        match self {
            ExamKind::Mock => "mock".to_string(),
            ExamKind::Practice(set) => format!("practice-{set}"),
        }
    }

    pub fn test_type(&self) -> TestType {
        match self {
            ExamKind::Mock => TestType::Mock,
            ExamKind::Practice(_) => TestType::Practice,
        }
    }

    pub fn test_name(&self, config: &Config) -> String {
        match self {
            ExamKind::Mock => config.mock_test_name.clone(),
            ExamKind::Practice(set) => config
                .practice_label(set)
                .unwrap_or_else(|| set.clone()),
        }
    }

    pub fn time_budget_secs(&self, config: &Config) -> Option<u32> {
        match self {
            ExamKind::Mock => Some(config.mock_duration_secs),
            ExamKind::Practice(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExamError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition { action: &'static str, phase: Phase },
    #[error("unknown exam: {0}")]
    UnknownExam(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("no review available")]
    ReviewUnavailable,
    #[error("no questions available")]
    NoQuestions,
    #[error(transparent)]
    Store(#[from] StoreError),
}
