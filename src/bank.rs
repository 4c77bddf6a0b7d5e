// src/bank.rs

//! Question-bank sources. Each set is one `{ "results": [...] }` document.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::models::question::BankFile;

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("question set {0} not found")]
    NotFound(String),
    #[error("failed to read question set {set}: {message}")]
    Io { set: String, message: String },
    #[error("question set {set} is malformed: {message}")]
    Malformed { set: String, message: String },
}

#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn load(&self, set: &str) -> Result<BankFile, BankError>;
}

/// Reads `<dir>/<set>.json`.
pub struct JsonDirBank {
    dir: PathBuf,
}

impl JsonDirBank {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl QuestionBank for JsonDirBank {
    async fn load(&self, set: &str) -> Result<BankFile, BankError> {
        // Set names come from configuration, but never let one escape the bank directory.
        if set.is_empty() || !set.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(BankError::NotFound(set.to_string()));
        }
        let path = self.dir.join(format!("{set}.json"));
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BankError::NotFound(set.to_string())
            } else {
                BankError::Io {
                    set: set.to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        serde_json::from_str(&raw).map_err(|e| BankError::Malformed {
            set: set.to_string(),
            message: e.to_string(),
        })
    }
}

/// Sets held in memory, keyed by name.
#[derive(Default, Clone)]
pub struct StaticBank {
    sets: HashMap<String, BankFile>,
}

impl StaticBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_set(mut self, name: &str, file: BankFile) -> Self {
        self.sets.insert(name.to_string(), file);
        self
    }
}

#[async_trait]
impl QuestionBank for StaticBank {
    async fn load(&self, set: &str) -> Result<BankFile, BankError> {
        self.sets
            .get(set)
            .cloned()
            .ok_or_else(|| BankError::NotFound(set.to_string()))
    }
}
