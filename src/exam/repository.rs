// src/exam/repository.rs

use std::collections::BTreeSet;

use crate::{
    cache::{LocalCache, ScopedCache},
    exam::{Phase, scoring::AnswerMap},
    models::question::Question,
};

/// Persisted pieces of an in-progress attempt. Every field is optional:
/// on load, `None` means absent or unreadable; on save, `None` means
/// "leave this key alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFields {
    pub questions: Option<Vec<Question>>,
    pub current_index: Option<usize>,
    pub answers: Option<AnswerMap>,
    pub answered: Option<BTreeSet<usize>>,
    pub saved: Option<BTreeSet<usize>>,
    pub remaining_seconds: Option<u32>,
    pub started_at_ms: Option<i64>,
    pub phase: Option<Phase>,
    pub attempt_id: Option<String>,
}

/// Storage seam of the exam engine. The engine never touches the medium
/// directly, so tests can run it against an in-memory cache.
pub trait SessionRepository: Send {
    fn load(&self) -> SessionFields;
    fn save(&self, patch: SessionFields);
    fn clear(&self);
}

const QUESTIONS: &str = "questions";
const CURRENT_INDEX: &str = "current_index";
const ANSWERS: &str = "answers";
const ANSWERED: &str = "answered";
const SAVED: &str = "saved";
const REMAINING_SECONDS: &str = "remaining_seconds";
const STARTED_AT: &str = "started_at";
const PHASE: &str = "phase";
const ATTEMPT_ID: &str = "attempt_id";

const ALL_KEYS: [&str; 9] = [
    QUESTIONS,
    CURRENT_INDEX,
    ANSWERS,
    ANSWERED,
    SAVED,
    REMAINING_SECONDS,
    STARTED_AT,
    PHASE,
    ATTEMPT_ID,
];

/// One cache key per field, under a per-user, per-exam scope.
#[derive(Clone)]
pub struct CacheSessionRepository {
    cache: ScopedCache,
}

impl CacheSessionRepository {
    pub fn new(cache: ScopedCache) -> Self {
        Self { cache }
    }
}

impl SessionRepository for CacheSessionRepository {
    fn load(&self) -> SessionFields {
        SessionFields {
            questions: self.cache.read(QUESTIONS),
            current_index: self.cache.read(CURRENT_INDEX),
            answers: self.cache.read(ANSWERS),
            answered: self.cache.read(ANSWERED),
            saved: self.cache.read(SAVED),
            remaining_seconds: self.cache.read(REMAINING_SECONDS),
            started_at_ms: self.cache.read(STARTED_AT),
            phase: self.cache.read(PHASE),
            attempt_id: self.cache.read(ATTEMPT_ID),
        }
    }

    fn save(&self, patch: SessionFields) {
        if let Some(v) = patch.questions {
            self.cache.write(QUESTIONS, &v);
        }
        if let Some(v) = patch.current_index {
            self.cache.write(CURRENT_INDEX, &v);
        }
        if let Some(v) = patch.answers {
            self.cache.write(ANSWERS, &v);
        }
        if let Some(v) = patch.answered {
            self.cache.write(ANSWERED, &v);
        }
        if let Some(v) = patch.saved {
            self.cache.write(SAVED, &v);
        }
        if let Some(v) = patch.remaining_seconds {
            self.cache.write(REMAINING_SECONDS, &v);
        }
        if let Some(v) = patch.started_at_ms {
            self.cache.write(STARTED_AT, &v);
        }
        if let Some(v) = patch.phase {
            self.cache.write(PHASE, &v);
        }
        if let Some(v) = patch.attempt_id {
            self.cache.write(ATTEMPT_ID, &v);
        }
    }

    fn clear(&self) {
        for key in ALL_KEYS {
            self.cache.remove(key);
        }
    }
}
