// src/exam/hub.rs

//! Live exam engines, one per (user, exam), each with its own countdown task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    bank::QuestionBank,
    cache::{LocalCache, ScopedCache},
    config::Config,
    exam::{
        ExamError, ExamKind, Phase, normalizer,
        reconciler::{Reconciler, SaveStatus},
        repository::CacheSessionRepository,
        session::{ExamEngine, ExamSettings, Examinee, TickOutcome},
        view::SessionView,
    },
    models::{question::Question, user::User},
    store::RemoteStore,
};

type Engine = ExamEngine<CacheSessionRepository>;

/// How often request handling looks for finished exams to evict.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-question actions that never fail; out-of-phase calls are no-ops.
#[derive(Debug, Clone)]
pub enum Action {
    Select(String),
    Save,
    Clear,
    Navigate(usize),
    Next,
    Previous,
}

struct LiveState {
    engine: Engine,
    save_status: Option<SaveStatus>,
    /// When the result reached the store; unset while unsaved.
    settled_at: Option<Instant>,
    /// Set once the exam left the hub's map. Holders of a stale handle re-open.
    retired: bool,
}

impl LiveState {
    fn new(engine: Engine) -> Self {
        Self {
            engine,
            save_status: None,
            settled_at: None,
            retired: false,
        }
    }

    fn settle(&mut self, status: SaveStatus) {
        self.settled_at = match status {
            SaveStatus::Error(_) => None,
            SaveStatus::Saved | SaveStatus::AlreadySaved => Some(Instant::now()),
        };
        self.save_status = Some(status);
    }

    fn view(&self) -> SessionView {
        let settings = self.engine.settings();
        SessionView::build(
            self.engine.session(),
            settings.kind.id(),
            &settings.test_name,
            settings.time_budget_secs.is_some(),
            self.save_status.clone(),
        )
    }
}

/// One open exam. All operations on it are serialized by the async mutex,
/// so a timer expiry and a manual submit never interleave.
struct LiveExam {
    state: Arc<tokio::sync::Mutex<LiveState>>,
    countdown: Mutex<Option<JoinHandle<()>>>,
}

impl LiveExam {
    fn new(engine: Engine) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(tokio::sync::Mutex::new(LiveState::new(engine))),
            countdown: Mutex::new(None),
        })
    }

    fn stop_countdown(&self) {
        if let Some(handle) = lock(&self.countdown).take() {
            handle.abort();
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Running and recently finished exams.
///
/// Only attempts that are in progress, or finished and not yet out of
/// `finished_exam_ttl_secs`, are held in memory. Untouched exams are served
/// straight from the cache, and a finished exam whose result reached the
/// store is dropped once its TTL passes; a later request rebuilds it.
pub struct ExamHub {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    bank: Arc<dyn QuestionBank>,
    config: Config,
    live: Mutex<HashMap<(Uuid, ExamKind), Arc<LiveExam>>>,
    last_sweep: Mutex<Instant>,
}

impl ExamHub {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        bank: Arc<dyn QuestionBank>,
        config: Config,
    ) -> Self {
        Self {
            store,
            cache,
            bank,
            config,
            live: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parse_kind(&self, raw: &str) -> Result<ExamKind, ExamError> {
        ExamKind::parse(raw, &self.config)
    }

    /// The user's reconciler: submitted-id ledger and local history.
    pub fn reconciler(&self, user_id: Uuid) -> Reconciler {
        Reconciler::new(
            ScopedCache::new(self.cache.clone(), user_id.to_string()),
            self.store.clone(),
        )
    }

    fn settings(&self, kind: &ExamKind) -> ExamSettings {
        ExamSettings {
            kind: kind.clone(),
            test_name: kind.test_name(&self.config),
            time_budget_secs: kind.time_budget_secs(&self.config),
        }
    }

    fn repository(&self, user_id: Uuid, kind: &ExamKind) -> CacheSessionRepository {
        let scope = format!("{}:{}", user_id, kind.key());
        CacheSessionRepository::new(ScopedCache::new(self.cache.clone(), scope))
    }

    fn fresh_engine(&self, user: &User, kind: &ExamKind) -> Engine {
        ExamEngine::new(
            self.settings(kind),
            examinee(user),
            self.repository(user.id, kind),
        )
    }

    fn lookup(&self, user_id: Uuid, kind: &ExamKind) -> Option<Arc<LiveExam>> {
        lock(&self.live).get(&(user_id, kind.clone())).cloned()
    }

    /// Removes `live` from the map unless it was already replaced.
    fn forget(&self, user_id: Uuid, kind: &ExamKind, live: &Arc<LiveExam>) {
        let key = (user_id, kind.clone());
        let mut map = lock(&self.live);
        if map.get(&key).is_some_and(|current| Arc::ptr_eq(current, live)) {
            map.remove(&key);
        }
    }

    /// The open exam, rebuilt from the cache when nothing is live.
    ///
    /// A rebuilt exam that has not started is only registered when
    /// `keep_idle` is set; otherwise the caller gets a detached copy.
    fn open(&self, user: &User, kind: &ExamKind, keep_idle: bool) -> Arc<LiveExam> {
        self.sweep_if_due();
        if let Some(live) = self.lookup(user.id, kind) {
            return live;
        }

        let engine = ExamEngine::resume(
            self.settings(kind),
            examinee(user),
            self.repository(user.id, kind),
        );
        if !keep_idle && engine.phase() == Phase::NotStarted {
            return LiveExam::new(engine);
        }
        let resumed = engine.phase() == Phase::InProgress;

        let key = (user.id, kind.clone());
        let mut map = lock(&self.live);
        // Another request may have rebuilt the same exam meanwhile.
        if let Some(existing) = map.get(&key) {
            return existing.clone();
        }
        let live = LiveExam::new(engine);
        if resumed {
            tracing::info!("Resumed {} attempt for {} from cache", kind.id(), user.id);
            self.spawn_countdown(&live, user.id);
        }
        map.insert(key, live.clone());
        live
    }

    /// Opens the exam and locks it, retrying if it was retired while waiting.
    async fn acquire(
        &self,
        user: &User,
        kind: &ExamKind,
        keep_idle: bool,
    ) -> (Arc<LiveExam>, OwnedMutexGuard<LiveState>) {
        loop {
            let live = self.open(user, kind, keep_idle);
            let state = live.state.clone().lock_owned().await;
            if !state.retired {
                return (live, state);
            }
        }
    }

    fn sweep_if_due(&self) {
        {
            let mut last = lock(&self.last_sweep);
            if last.elapsed() < SWEEP_INTERVAL {
                return;
            }
            *last = Instant::now();
        }
        self.evict_settled();
    }

    /// Drops finished exams whose result reached the store at least
    /// `finished_exam_ttl_secs` ago. Exams busy with a request are skipped.
    /// Returns how many were dropped.
    pub fn evict_settled(&self) -> usize {
        let ttl = Duration::from_secs(self.config.finished_exam_ttl_secs);
        let entries: Vec<_> = lock(&self.live)
            .iter()
            .map(|(key, live)| (key.clone(), live.clone()))
            .collect();

        let mut evicted = 0;
        for ((user_id, kind), live) in entries {
            let Ok(mut state) = live.state.try_lock() else {
                continue;
            };
            if state.settled_at.is_some_and(|at| at.elapsed() >= ttl) {
                state.retired = true;
                self.forget(user_id, &kind, &live);
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!("Evicted {} finished exams", evicted);
        }
        evicted
    }

    fn spawn_countdown(&self, live: &Arc<LiveExam>, user_id: Uuid) {
        live.stop_countdown();
        let task_state = live.state.clone();
        let reconciler = self.reconciler(user_id);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut state = task_state.lock().await;
                match state.engine.tick(Utc::now()) {
                    TickOutcome::Running(_) => {}
                    TickOutcome::Idle => break,
                    TickOutcome::Expired(finalized) => {
                        let status = reconciler.reconcile(&finalized.record).await;
                        state.settle(status);
                        break;
                    }
                }
            }
        });
        *lock(&live.countdown) = Some(handle);
    }

    async fn load_questions(&self, kind: &ExamKind) -> Result<Vec<Question>, ExamError> {
        let sets = match kind {
            ExamKind::Mock => self.config.question_sets.clone(),
            ExamKind::Practice(set) => vec![set.clone()],
        };
        let sources = normalizer::load_sources(self.bank.as_ref(), &sets).await;

        let mut rng = rand::thread_rng();
        let questions = match kind {
            ExamKind::Mock => {
                normalizer::assemble_mock(&sources, self.config.mock_question_count, &mut rng)
            }
            ExamKind::Practice(_) => normalizer::normalize_sources(&sources, &mut rng),
        };
        if questions.is_empty() {
            return Err(ExamError::NoQuestions);
        }
        Ok(questions)
    }

    pub async fn view(&self, user: &User, kind: &ExamKind) -> SessionView {
        let (_, state) = self.acquire(user, kind, false).await;
        state.view()
    }

    /// Starts a new attempt. A finished attempt is replaced by a fresh one;
    /// a running attempt must be submitted first.
    pub async fn start(&self, user: &User, kind: &ExamKind) -> Result<SessionView, ExamError> {
        let (live, mut state) = self.acquire(user, kind, true).await;

        let started = self.begin(user, kind, &live, &mut state).await;
        if started.is_err() && state.engine.phase() == Phase::NotStarted {
            state.retired = true;
            self.forget(user.id, kind, &live);
        }
        started
    }

    async fn begin(
        &self,
        user: &User,
        kind: &ExamKind,
        live: &Arc<LiveExam>,
        state: &mut LiveState,
    ) -> Result<SessionView, ExamError> {
        if matches!(state.engine.phase(), Phase::Complete | Phase::Review) {
            *state = LiveState::new(self.fresh_engine(user, kind));
        }
        if state.engine.phase() == Phase::NotStarted && !state.engine.is_prepared() {
            let questions = self.load_questions(kind).await?;
            state.engine.prepare(questions)?;
        }
        state.engine.start(Utc::now())?;

        if state.engine.settings().time_budget_secs.is_some() {
            self.spawn_countdown(live, user.id);
        }
        Ok(state.view())
    }

    pub async fn act(&self, user: &User, kind: &ExamKind, action: Action) -> SessionView {
        let (_, mut state) = self.acquire(user, kind, false).await;
        let engine = &mut state.engine;
        let changed = match action {
            Action::Select(id) => engine.select_answer(&id),
            Action::Save => engine.save_answer(),
            Action::Clear => engine.clear_selection(),
            Action::Navigate(index) => engine.navigate(index),
            Action::Next => engine.next(),
            Action::Previous => engine.previous(),
        };
        if !changed {
            tracing::debug!("No-op exam action on {} for {}", kind.id(), user.id);
        }
        state.view()
    }

    /// Submits the running attempt and saves it. When the attempt already
    /// finished (e.g. the countdown got there first) the save is re-checked
    /// against the submitted-id ledger instead, which does not write twice.
    pub async fn submit(&self, user: &User, kind: &ExamKind) -> Result<SessionView, ExamError> {
        let (live, mut state) = self.acquire(user, kind, false).await;
        let reconciler = self.reconciler(user.id);

        let record = match state.engine.phase() {
            Phase::InProgress => state.engine.submit(Utc::now())?.record,
            Phase::Complete | Phase::Review => match state.engine.last_submission() {
                Some(record) => record.clone(),
                None => return Ok(state.view()),
            },
            phase => {
                return Err(ExamError::InvalidTransition {
                    action: "submit",
                    phase,
                });
            }
        };
        live.stop_countdown();

        let status = reconciler.reconcile(&record).await;
        state.settle(status);
        Ok(state.view())
    }

    pub async fn enter_review(&self, user: &User, kind: &ExamKind) -> Result<SessionView, ExamError> {
        let (_, mut state) = self.acquire(user, kind, false).await;
        state.engine.enter_review()?;
        Ok(state.view())
    }

    /// Pushes the retained record of the finished attempt again.
    pub async fn retry_save(&self, user: &User, kind: &ExamKind) -> Result<SessionView, ExamError> {
        let (_, mut state) = self.acquire(user, kind, false).await;
        let Some(record) = state.engine.last_submission().cloned() else {
            return Err(ExamError::InvalidTransition {
                action: "retry-save",
                phase: state.engine.phase(),
            });
        };
        let status = self.reconciler(user.id).push(&record).await;
        state.settle(status);
        Ok(state.view())
    }

    /// Navigating away: the countdown stops and a running attempt is dropped
    /// from memory. Its cache entries stay for `resume`.
    pub async fn suspend(&self, user: &User, kind: &ExamKind) {
        let Some(live) = self.lookup(user.id, kind) else {
            return;
        };
        live.stop_countdown();
        let mut state = live.state.lock().await;
        if state.engine.phase() == Phase::InProgress {
            state.retired = true;
            self.forget(user.id, kind, &live);
            tracing::info!("Suspended {} attempt for {}", kind.id(), user.id);
        }
    }

    /// Coming back: rebuild from the cache and restart the countdown.
    pub async fn resume(&self, user: &User, kind: &ExamKind) -> SessionView {
        if let Some(live) = self.lookup(user.id, kind) {
            let mut state = live.state.lock().await;
            if state.engine.phase() != Phase::InProgress {
                return state.view();
            }
            live.stop_countdown();
            state.retired = true;
            self.forget(user.id, kind, &live);
        }
        self.view(user, kind).await
    }

    /// Stops every countdown task.
    pub fn shutdown(&self) {
        for live in lock(&self.live).values() {
            live.stop_countdown();
        }
    }
}

fn examinee(user: &User) -> Examinee {
    Examinee {
        user_id: user.id,
        register_no: Some(user.register_no.clone()),
        student_name: user.student_name.clone(),
    }
}
