//! Remote data store.
//!
//! The exam core talks to durable storage through [`RemoteStore`], a small
//! CRUD-with-filter capability over JSON rows. Rows are decoded into typed
//! models at this boundary (see [`decode`]) so loosely shaped data never
//! reaches scoring or review logic.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Row = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique key violation (e.g. the same attempt id inserted twice).
    #[error("{0}")]
    Conflict(String),
    #[error("malformed row in {table}: {message}")]
    Malformed { table: &'static str, message: String },
    #[error("unknown column {column} on {table}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            // Postgres error code for unique violation is 23505
            if db.code().as_deref() == Some("23505") {
                return StoreError::Conflict(db.message().to_string());
            }
        }
        StoreError::Backend(err.to_string())
    }
}

/// Tables the service reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Sessions,
    TestLogs,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Sessions => "sessions",
            Table::TestLogs => "test_logs",
        }
    }

    /// Column allowlist; anything else is rejected before reaching SQL.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Users => &[
                "id",
                "register_no",
                "password",
                "student_name",
                "is_admin",
                "created_at",
            ],
            Table::Sessions => &["id", "user_id", "token", "expires_at", "created_at"],
            Table::TestLogs => &[
                "id",
                "user_id",
                "register_no",
                "student_name",
                "test_name",
                "test_type",
                "score",
                "total_questions",
                "questions_answered",
                "percentage",
                "time_spent",
                "taken_at",
                "questions_map",
                "questions_snapshot",
            ],
        }
    }

    pub fn check_column(&self, column: &str) -> Result<&'static str, StoreError> {
        self.columns()
            .iter()
            .copied()
            .find(|c| *c == column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.name(),
                column: column.to_string(),
            })
    }
}

/// Conjunction of column equality tests.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Order {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Order {
            column: column.to_string(),
            ascending: false,
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn insert(&self, table: Table, record: Row) -> Result<Row, StoreError>;

    async fn select_one(&self, table: Table, filter: &Filter) -> Result<Option<Row>, StoreError>;

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<&Order>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Applies `patch` to every matching row; returns the updated rows.
    async fn update(&self, table: Table, filter: &Filter, patch: Row)
    -> Result<Vec<Row>, StoreError>;

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), StoreError>;
}

/// Decodes a row into a typed model, rejecting malformed shapes.
pub fn decode<T: DeserializeOwned>(table: Table, row: Row) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Malformed {
        table: table.name(),
        message: e.to_string(),
    })
}

/// Encodes a typed model into a row for insertion.
pub fn encode<T: Serialize>(table: Table, value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(StoreError::Malformed {
            table: table.name(),
            message: "record is not an object".to_string(),
        }),
        Err(e) => Err(StoreError::Malformed {
            table: table.name(),
            message: e.to_string(),
        }),
    }
}
