// src/exam/session.rs

//! The exam lifecycle: not-started -> in-progress -> complete -> review.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    exam::{
        ExamError, ExamKind, Phase,
        repository::{SessionFields, SessionRepository},
        scoring::{self, AnswerMap, ScoreReport},
    },
    models::{
        question::{Question, QuestionType},
        submission::SubmissionRecord,
    },
};

/// Who is sitting the exam; copied into the submission record.
#[derive(Debug, Clone)]
pub struct Examinee {
    pub user_id: Uuid,
    pub register_no: Option<String>,
    pub student_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExamSettings {
    pub kind: ExamKind,
    pub test_name: String,
    /// `None` for untimed practice.
    pub time_budget_secs: Option<u32>,
}

/// State of one attempt, live or reconstructed for review.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSession {
    pub attempt_id: Option<String>,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub answers: AnswerMap,
    pub answered: BTreeSet<usize>,
    pub saved: BTreeSet<usize>,
    /// Selection on the current question that has not been saved yet.
    pub selection: Vec<String>,
    pub remaining_seconds: u32,
    pub started_at_ms: Option<i64>,
    pub phase: Phase,
    pub report: Option<ScoreReport>,
}

impl ExamSession {
    pub fn new(time_budget_secs: Option<u32>) -> Self {
        Self {
            attempt_id: None,
            questions: Vec::new(),
            current_index: 0,
            answers: BTreeMap::new(),
            answered: BTreeSet::new(),
            saved: BTreeSet::new(),
            selection: Vec::new(),
            remaining_seconds: time_budget_secs.unwrap_or(0),
            started_at_ms: None,
            phase: Phase::NotStarted,
            report: None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    fn committed_selection(&self, index: usize) -> Vec<String> {
        self.answers.get(&index).cloned().unwrap_or_default()
    }
}

/// A finished attempt: the record to persist and the score it was built from.
#[derive(Debug, Clone)]
pub struct Finalized {
    pub record: SubmissionRecord,
    pub report: ScoreReport,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Not running, or untimed.
    Idle,
    Running(u32),
    /// Time ran out; the attempt was finalized exactly as a submit would.
    Expired(Finalized),
}

/// `m:ss`
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Drives one attempt and writes every change through to its repository.
pub struct ExamEngine<R: SessionRepository> {
    session: ExamSession,
    settings: ExamSettings,
    examinee: Examinee,
    repo: R,
    /// Record of the last finalized attempt, kept for save retries.
    submission: Option<SubmissionRecord>,
}

impl<R: SessionRepository> ExamEngine<R> {
    /// A fresh, not-started engine. Nothing is read from the repository.
    pub fn new(settings: ExamSettings, examinee: Examinee, repo: R) -> Self {
        Self {
            session: ExamSession::new(settings.time_budget_secs),
            settings,
            examinee,
            repo,
            submission: None,
        }
    }

    /// Rebuilds the engine from whatever the repository still holds.
    /// Unreadable or inconsistent entries fall back to defaults.
    pub fn resume(settings: ExamSettings, examinee: Examinee, repo: R) -> Self {
        let cached = repo.load();
        let mut session = ExamSession::new(settings.time_budget_secs);

        session.questions = cached.questions.unwrap_or_default();
        let mut phase = cached.phase.unwrap_or(Phase::NotStarted);
        if session.questions.is_empty() || matches!(phase, Phase::Complete | Phase::Review) {
            phase = Phase::NotStarted;
        }
        session.phase = phase;

        if phase == Phase::InProgress {
            let len = session.questions.len();
            session.answers = cached
                .answers
                .unwrap_or_default()
                .into_iter()
                .filter(|(index, _)| *index < len)
                .collect();
            session.answered = cached.answered.unwrap_or_default();
            session.answered.retain(|i| *i < len);
            session.saved = cached.saved.unwrap_or_default();
            session.saved.retain(|i| *i < len);
            session.current_index = cached.current_index.filter(|i| *i < len).unwrap_or(0);
            if let Some(remaining) = cached.remaining_seconds {
                session.remaining_seconds = remaining;
            }
            session.started_at_ms = cached.started_at_ms;
            session.attempt_id = cached.attempt_id;
            session.selection = session.committed_selection(session.current_index);
        }

        Self {
            session,
            settings,
            examinee,
            repo,
            submission: None,
        }
    }

    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn is_prepared(&self) -> bool {
        !self.session.questions.is_empty()
    }

    pub fn last_submission(&self) -> Option<&SubmissionRecord> {
        self.submission.as_ref()
    }

    /// Installs the question set for a not-started attempt and caches it.
    pub fn prepare(&mut self, questions: Vec<Question>) -> Result<(), ExamError> {
        self.expect_phase(Phase::NotStarted, "prepare")?;
        self.repo.save(SessionFields {
            questions: Some(questions.clone()),
            phase: Some(Phase::NotStarted),
            ..Default::default()
        });
        self.session.questions = questions;
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), ExamError> {
        self.expect_phase(Phase::NotStarted, "start")?;
        if self.session.questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }

        let s = &mut self.session;
        s.answers.clear();
        s.answered.clear();
        s.saved.clear();
        s.selection.clear();
        s.report = None;
        s.current_index = 0;
        s.remaining_seconds = self.settings.time_budget_secs.unwrap_or(0);
        s.started_at_ms = Some(now.timestamp_millis());
        s.attempt_id = Some(Uuid::new_v4().to_string());
        s.phase = Phase::InProgress;

        self.repo.save(SessionFields {
            current_index: Some(0),
            answers: Some(AnswerMap::new()),
            answered: Some(BTreeSet::new()),
            saved: Some(BTreeSet::new()),
            remaining_seconds: Some(s.remaining_seconds),
            started_at_ms: s.started_at_ms,
            phase: Some(Phase::InProgress),
            attempt_id: s.attempt_id.clone(),
            ..Default::default()
        });
        tracing::info!(
            "Attempt {:?} started for {} ({} questions)",
            s.attempt_id,
            self.examinee.user_id,
            s.questions.len()
        );
        Ok(())
    }

    /// Single-select replaces the selection; multi-select toggles membership.
    /// Nothing is committed until `save_answer`.
    pub fn select_answer(&mut self, answer_id: &str) -> bool {
        if self.session.phase != Phase::InProgress {
            return false;
        }
        let Some(question) = self.session.current_question() else {
            return false;
        };
        if !question.has_answer(answer_id) {
            return false;
        }
        match question.question_type {
            QuestionType::SingleSelect => {
                self.session.selection = vec![answer_id.to_string()];
            }
            QuestionType::MultiSelect => {
                let selection = &mut self.session.selection;
                if let Some(pos) = selection.iter().position(|id| id == answer_id) {
                    selection.remove(pos);
                } else {
                    selection.push(answer_id.to_string());
                }
            }
        }
        true
    }

    /// Commits the current selection and moves on. No-op when nothing is selected.
    pub fn save_answer(&mut self) -> bool {
        if self.session.phase != Phase::InProgress || self.session.selection.is_empty() {
            return false;
        }
        let s = &mut self.session;
        let index = s.current_index;
        s.answers.insert(index, s.selection.clone());
        s.answered.insert(index);
        s.saved.insert(index);
        if index + 1 < s.questions.len() {
            s.current_index = index + 1;
            s.selection = s.committed_selection(s.current_index);
        }

        self.repo.save(SessionFields {
            current_index: Some(s.current_index),
            answers: Some(s.answers.clone()),
            answered: Some(s.answered.clone()),
            saved: Some(s.saved.clone()),
            ..Default::default()
        });
        true
    }

    pub fn clear_selection(&mut self) -> bool {
        if self.session.phase != Phase::InProgress {
            return false;
        }
        self.session.selection.clear();
        true
    }

    /// Moves to `index`, discarding any unsaved selection and loading the
    /// committed one for the new position.
    pub fn navigate(&mut self, index: usize) -> bool {
        if self.session.phase == Phase::NotStarted || index >= self.session.questions.len() {
            return false;
        }
        self.session.current_index = index;
        self.session.selection = self.session.committed_selection(index);
        if self.session.phase == Phase::InProgress {
            self.repo.save(SessionFields {
                current_index: Some(index),
                ..Default::default()
            });
        }
        true
    }

    pub fn next(&mut self) -> bool {
        self.navigate(self.session.current_index + 1)
    }

    pub fn previous(&mut self) -> bool {
        match self.session.current_index.checked_sub(1) {
            Some(index) => self.navigate(index),
            None => false,
        }
    }

    /// One second of countdown. Reaching zero finalizes the attempt using
    /// only saved answers.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.session.phase != Phase::InProgress || self.settings.time_budget_secs.is_none() {
            return TickOutcome::Idle;
        }
        if self.session.remaining_seconds <= 1 {
            self.session.remaining_seconds = 0;
            tracing::info!("Time expired for attempt {:?}", self.session.attempt_id);
            return TickOutcome::Expired(self.finalize(now));
        }
        self.session.remaining_seconds -= 1;
        self.repo.save(SessionFields {
            remaining_seconds: Some(self.session.remaining_seconds),
            ..Default::default()
        });
        TickOutcome::Running(self.session.remaining_seconds)
    }

    /// Scores the committed answers, completes the attempt and purges the cache.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<Finalized, ExamError> {
        self.expect_phase(Phase::InProgress, "submit")?;
        Ok(self.finalize(now))
    }

    pub fn enter_review(&mut self) -> Result<(), ExamError> {
        self.expect_phase(Phase::Complete, "review")?;
        self.session.phase = Phase::Review;
        self.session.current_index = 0;
        self.session.selection = self.session.committed_selection(0);
        Ok(())
    }

    fn finalize(&mut self, now: DateTime<Utc>) -> Finalized {
        let report = scoring::score(&self.session.questions, &self.session.answers);
        self.session.report = Some(report.clone());
        self.session.phase = Phase::Complete;
        self.session.selection = self.session.committed_selection(self.session.current_index);

        let record = self.build_record(&report, now);
        self.repo.clear();
        self.submission = Some(record.clone());

        tracing::info!(
            "Attempt {} completed: {}/{} ({}%)",
            record.id,
            record.score,
            record.total_questions,
            record.percentage
        );
        Finalized { record, report }
    }

    fn build_record(&self, report: &ScoreReport, now: DateTime<Utc>) -> SubmissionRecord {
        let s = &self.session;
        let total = s.questions.len();

        let questions_map: BTreeMap<String, Vec<String>> = s
            .answers
            .iter()
            .filter_map(|(index, ids)| {
                s.questions
                    .get(*index)
                    .map(|q| (q.id.to_string(), ids.clone()))
            })
            .collect();

        let elapsed_secs = match self.settings.time_budget_secs {
            Some(budget) => u64::from(budget.saturating_sub(s.remaining_seconds)),
            None => s
                .started_at_ms
                .map(|started| (now.timestamp_millis() - started).max(0) as u64 / 1000)
                .unwrap_or(0),
        };

        SubmissionRecord {
            id: s
                .attempt_id
                .clone()
                .unwrap_or_else(|| now.timestamp_millis().to_string()),
            user_id: self.examinee.user_id,
            register_no: self.examinee.register_no.clone(),
            student_name: self.examinee.student_name.clone(),
            test_name: self.settings.test_name.clone(),
            test_type: self.settings.kind.test_type(),
            score: report.total_correct as i32,
            total_questions: total as i32,
            questions_answered: s.answers.len() as i32,
            percentage: scoring::percentage(report.total_correct, total) as i32,
            time_spent: Some(format_duration(elapsed_secs)),
            taken_at: now,
            questions_map: Some(questions_map),
            questions_snapshot: Some(s.questions.clone()),
        }
    }

    fn expect_phase(&self, expected: Phase, action: &'static str) -> Result<(), ExamError> {
        if self.session.phase == expected {
            Ok(())
        } else {
            Err(ExamError::InvalidTransition {
                action,
                phase: self.session.phase,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        cache::{LocalCache, MemoryCache, ScopedCache},
        exam::repository::CacheSessionRepository,
        models::question::Answer,
    };
    use std::sync::Arc;

    pub(crate) fn question(id: i64, kind: QuestionType, correct: &[&str]) -> Question {
        Question {
            id,
            question_type: kind,
            prompt_html: format!("Question {id}"),
            answers: ["c", "a", "d", "b"]
                .iter()
                .map(|a| Answer {
                    id: a.to_string(),
                    text: format!("option {a}"),
                    is_correct: correct.contains(a),
                    feedback: String::new(),
                })
                .collect(),
            explanation_html: "why".to_string(),
            section: "Basics".to_string(),
            reference_links: Vec::new(),
            source_set: "questions".to_string(),
        }
    }

    pub(crate) fn examinee() -> Examinee {
        Examinee {
            user_id: Uuid::new_v4(),
            register_no: Some("REG1".to_string()),
            student_name: Some("Student".to_string()),
        }
    }

    pub(crate) fn mock_settings(budget: u32) -> ExamSettings {
        ExamSettings {
            kind: ExamKind::Mock,
            test_name: "Mock".to_string(),
            time_budget_secs: Some(budget),
        }
    }

    pub(crate) fn mock_questions(n: i64) -> Vec<Question> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    question(100 + i, QuestionType::SingleSelect, &["b"])
                } else {
                    question(100 + i, QuestionType::MultiSelect, &["a", "c"])
                }
            })
            .collect()
    }

    fn engine_with(
        cache: Arc<dyn LocalCache>,
        budget: u32,
        n: i64,
    ) -> ExamEngine<CacheSessionRepository> {
        let repo = CacheSessionRepository::new(ScopedCache::new(cache, "u:mock"));
        let mut engine = ExamEngine::new(mock_settings(budget), examinee(), repo);
        engine.prepare(mock_questions(n)).unwrap();
        engine.start(Utc::now()).unwrap();
        engine
    }

    fn started(n: i64) -> ExamEngine<CacheSessionRepository> {
        engine_with(Arc::new(MemoryCache::new()), 5400, n)
    }

    #[test]
    fn start_requires_not_started_and_questions() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let repo = CacheSessionRepository::new(ScopedCache::new(cache, "u:mock"));
        let mut engine = ExamEngine::new(mock_settings(60), examinee(), repo);
        assert!(matches!(engine.start(Utc::now()), Err(ExamError::NoQuestions)));

        engine.prepare(mock_questions(2)).unwrap();
        engine.start(Utc::now()).unwrap();
        assert_eq!(engine.phase(), Phase::InProgress);
        assert_eq!(engine.session().remaining_seconds, 60);
        assert!(engine.session().attempt_id.is_some());
        assert!(matches!(
            engine.start(Utc::now()),
            Err(ExamError::InvalidTransition { action: "start", .. })
        ));
    }

    #[test]
    fn single_select_replaces_and_multi_select_toggles() {
        let mut engine = started(2);
        assert!(engine.select_answer("a"));
        assert!(engine.select_answer("b"));
        assert_eq!(engine.session().selection, vec!["b".to_string()]);
        assert!(!engine.select_answer("z"));

        engine.next();
        engine.select_answer("a");
        engine.select_answer("c");
        engine.select_answer("a");
        assert_eq!(engine.session().selection, vec!["c".to_string()]);
    }

    #[test]
    fn save_with_empty_selection_is_a_no_op() {
        let mut engine = started(3);
        let before = engine.session().clone();
        assert!(!engine.save_answer());
        assert_eq!(engine.session(), &before);
    }

    #[test]
    fn save_commits_and_advances() {
        let mut engine = started(3);
        engine.select_answer("b");
        assert!(engine.save_answer());
        let s = engine.session();
        assert_eq!(s.current_index, 1);
        assert_eq!(s.answers[&0], vec!["b".to_string()]);
        assert!(s.answered.contains(&0) && s.saved.contains(&0));
        assert!(s.selection.is_empty());
    }

    #[test]
    fn save_on_last_question_stays_put() {
        let mut engine = started(2);
        engine.navigate(1);
        engine.select_answer("a");
        engine.save_answer();
        assert_eq!(engine.session().current_index, 1);
    }

    #[test]
    fn unsaved_selection_is_discarded_on_navigation() {
        let mut engine = started(3);
        engine.select_answer("b");
        engine.next();
        engine.previous();
        assert!(engine.session().selection.is_empty());
        assert!(!engine.session().answered.contains(&0));

        let finalized = engine.submit(Utc::now()).unwrap();
        assert_eq!(finalized.report.total_correct, 0);
        assert!(finalized.report.incorrect.is_empty());
    }

    #[test]
    fn navigation_reloads_committed_selection_and_checks_bounds() {
        let mut engine = started(3);
        engine.select_answer("b");
        engine.save_answer();
        assert!(engine.navigate(0));
        assert_eq!(engine.session().selection, vec!["b".to_string()]);
        assert!(!engine.navigate(3));
        assert!(!engine.previous());
        assert_eq!(engine.session().current_index, 0);
    }

    #[test]
    fn clear_selection_leaves_committed_answer() {
        let mut engine = started(2);
        engine.select_answer("b");
        engine.save_answer();
        engine.previous();
        engine.clear_selection();
        assert!(engine.session().selection.is_empty());
        assert_eq!(engine.session().answers[&0], vec!["b".to_string()]);
    }

    #[test]
    fn expiry_scores_only_saved_answers() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let mut engine = engine_with(cache.clone(), 3, 57);
        for _ in 0..10 {
            engine.select_answer("b");
            engine.save_answer();
        }
        // Selected on question 10 but never saved.
        engine.select_answer("b");

        assert!(matches!(engine.tick(Utc::now()), TickOutcome::Running(2)));
        assert!(matches!(engine.tick(Utc::now()), TickOutcome::Running(1)));
        let TickOutcome::Expired(finalized) = engine.tick(Utc::now()) else {
            panic!("expected expiry");
        };

        // Even positions are single-select with answer "b": 5 right, 5 wrong.
        assert_eq!(finalized.report.total_correct, 5);
        assert_eq!(finalized.report.correct.len() + finalized.report.incorrect.len(), 10);
        assert!(!finalized.report.correct.contains(&10));
        assert_eq!(finalized.record.total_questions, 57);
        assert_eq!(finalized.record.percentage, 9); // round(500 / 57)
        assert_eq!(finalized.record.questions_answered, 10);
        assert_eq!(finalized.record.time_spent.as_deref(), Some("0:03"));
        assert_eq!(engine.phase(), Phase::Complete);
        assert_eq!(engine.session().remaining_seconds, 0);
        assert!(matches!(engine.tick(Utc::now()), TickOutcome::Idle));
        assert!(cache.get("u:mock:phase").is_none());
    }

    #[test]
    fn submit_builds_record_keyed_by_bank_id() {
        let mut engine = started(2);
        engine.select_answer("b");
        engine.save_answer();
        engine.select_answer("c");
        engine.select_answer("a");
        engine.save_answer();

        let finalized = engine.submit(Utc::now()).unwrap();
        let record = &finalized.record;
        assert_eq!(Some(&record.id), engine.session().attempt_id.as_ref());
        assert_eq!(record.score, 2);
        assert_eq!(record.percentage, 100);
        let map = record.questions_map.as_ref().unwrap();
        assert_eq!(map["100"], vec!["b".to_string()]);
        assert_eq!(map["101"], vec!["c".to_string(), "a".to_string()]);
        assert_eq!(record.questions_snapshot.as_ref().unwrap().len(), 2);
        assert!(matches!(
            engine.submit(Utc::now()),
            Err(ExamError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn review_freezes_answers() {
        let mut engine = started(2);
        engine.select_answer("b");
        engine.save_answer();
        assert!(engine.enter_review().is_err());
        engine.submit(Utc::now()).unwrap();
        engine.enter_review().unwrap();

        let before = engine.session().answers.clone();
        assert!(!engine.select_answer("a"));
        assert!(!engine.save_answer());
        assert!(!engine.clear_selection());
        assert!(engine.navigate(1));
        assert_eq!(engine.session().answers, before);
        assert_eq!(engine.phase(), Phase::Review);
    }

    #[test]
    fn resume_restores_in_progress_attempt() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let mut engine = engine_with(cache.clone(), 100, 4);
        engine.select_answer("b");
        engine.save_answer();
        engine.tick(Utc::now());
        let attempt = engine.session().attempt_id.clone();
        drop(engine);

        let repo = CacheSessionRepository::new(ScopedCache::new(cache, "u:mock"));
        let resumed = ExamEngine::resume(mock_settings(100), examinee(), repo);
        let s = resumed.session();
        assert_eq!(s.phase, Phase::InProgress);
        assert_eq!(s.current_index, 1);
        assert_eq!(s.remaining_seconds, 99);
        assert_eq!(s.answers[&0], vec!["b".to_string()]);
        assert_eq!(s.attempt_id, attempt);
    }

    #[test]
    fn resume_with_corrupt_cache_falls_back_to_defaults() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        cache.set("u:mock:phase", "\"in-progress\"".to_string());
        cache.set("u:mock:questions", "not json".to_string());
        let repo = CacheSessionRepository::new(ScopedCache::new(cache, "u:mock"));
        let resumed = ExamEngine::resume(mock_settings(100), examinee(), repo);
        assert_eq!(resumed.phase(), Phase::NotStarted);
        assert!(!resumed.is_prepared());
    }

    #[test]
    fn untimed_practice_never_expires() {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let repo = CacheSessionRepository::new(ScopedCache::new(cache, "u:practice"));
        let settings = ExamSettings {
            kind: ExamKind::Practice("questions".to_string()),
            test_name: "Practice Set 1".to_string(),
            time_budget_secs: None,
        };
        let mut engine = ExamEngine::new(settings, examinee(), repo);
        engine.prepare(mock_questions(1)).unwrap();
        engine.start(Utc::now()).unwrap();
        assert!(matches!(engine.tick(Utc::now()), TickOutcome::Idle));
        let finalized = engine.submit(Utc::now()).unwrap();
        assert_eq!(finalized.record.test_type, crate::models::submission::TestType::Practice);
    }

    #[test]
    fn durations_format_as_minutes_and_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(5400), "90:00");
    }
}
