// src/exam/reconciler.rs

//! Pushes finalized attempts to the remote store exactly once per attempt id.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::{
    cache::ScopedCache,
    models::submission::{SubmissionRecord, TestLogSummary},
    store::{RemoteStore, StoreError, Table, encode},
};

const SUBMITTED_IDS: &str = "submitted_ids";
const HISTORY: &str = "history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "message")]
pub enum SaveStatus {
    Saved,
    AlreadySaved,
    Error(String),
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStatus::Saved => f.write_str("saved"),
            SaveStatus::AlreadySaved => f.write_str("already-saved"),
            SaveStatus::Error(message) => write!(f, "error: {message}"),
        }
    }
}

pub struct Reconciler {
    cache: ScopedCache,
    store: Arc<dyn RemoteStore>,
}

impl Reconciler {
    /// `cache` is the caller's per-user scope; the submitted-id ledger and
    /// the local history copy live under it.
    pub fn new(cache: ScopedCache, store: Arc<dyn RemoteStore>) -> Self {
        Self { cache, store }
    }

    pub fn submitted_ids(&self) -> BTreeSet<String> {
        self.cache.read(SUBMITTED_IDS).unwrap_or_default()
    }

    pub fn local_history(&self) -> Vec<TestLogSummary> {
        self.cache.read(HISTORY).unwrap_or_default()
    }

    /// Replaces the local history copy with what the remote store returned.
    pub fn remember_history(&self, rows: &[TestLogSummary]) {
        self.cache.write(HISTORY, &rows);
    }

    /// Refreshes the local history entry with the same id. Never adds one.
    pub fn update_local_history(&self, record: &SubmissionRecord) -> bool {
        let mut history = self.local_history();
        let Some(entry) = history.iter_mut().find(|h| h.id == record.id) else {
            return false;
        };
        *entry = TestLogSummary::from(record.clone());
        self.cache.write(HISTORY, &history);
        true
    }

    /// Inserts the record unless its id is already known to be stored.
    pub async fn push(&self, record: &SubmissionRecord) -> SaveStatus {
        let mut submitted = self.submitted_ids();
        if submitted.contains(&record.id) {
            tracing::debug!("Attempt {} already saved, skipping insert", record.id);
            return SaveStatus::AlreadySaved;
        }

        let status = match self.insert(record).await {
            Ok(()) => SaveStatus::Saved,
            Err(StoreError::Conflict(_)) => {
                tracing::info!("Attempt {} was stored by another writer", record.id);
                SaveStatus::AlreadySaved
            }
            Err(e) => {
                tracing::error!("Failed to save attempt {}: {}", record.id, e);
                return SaveStatus::Error(e.to_string());
            }
        };

        // Re-read: another writer may have added ids since the check above.
        submitted = self.submitted_ids();
        submitted.insert(record.id.clone());
        self.cache.write(SUBMITTED_IDS, &submitted);
        status
    }

    /// Local history refresh followed by the idempotent push.
    pub async fn reconcile(&self, record: &SubmissionRecord) -> SaveStatus {
        self.update_local_history(record);
        self.push(record).await
    }

    async fn insert(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let row = encode(Table::TestLogs, record)?;
        self.store.insert(Table::TestLogs, row).await?;
        Ok(())
    }
}
