use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    bank::QuestionBank, cache::LocalCache, config::Config, exam::hub::ExamHub,
    store::RemoteStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RemoteStore>,
    pub hub: Arc<ExamHub>,
    pub config: Config,
}

impl AppState {
    /// Wires the exam hub over the given store, cache and question bank.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        bank: Arc<dyn QuestionBank>,
        config: Config,
    ) -> Self {
        let hub = Arc::new(ExamHub::new(store.clone(), cache, bank, config.clone()));
        Self { store, hub, config }
    }
}

impl FromRef<AppState> for Arc<dyn RemoteStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<ExamHub> {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
