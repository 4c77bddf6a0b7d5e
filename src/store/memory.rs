// src/store/memory.rs

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{Filter, Order, RemoteStore, Row, StoreError, Table};

/// In-process store with the same uniqueness rules as the SQL schema.
/// Used by tests and by local runs without a database.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, Vec<Row>>>,
    insert_failure: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent insert fail with `message` (until reset with `None`).
    pub fn set_insert_failure(&self, message: Option<&str>) {
        *lock(&self.insert_failure) = message.map(str::to_string);
    }

    fn unique_columns(table: Table) -> &'static [&'static str] {
        match table {
            Table::Users => &["id", "register_no"],
            Table::Sessions => &["id", "token"],
            Table::TestLogs => &["id"],
        }
    }

    fn apply_defaults(table: Table, row: &mut Row) {
        if !row.contains_key("id") {
            row.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        let now = Value::String(Utc::now().to_rfc3339());
        match table {
            Table::Users => {
                row.entry("is_admin").or_insert(Value::Bool(false));
                row.entry("password").or_insert(Value::Null);
                row.entry("student_name").or_insert(Value::Null);
                row.entry("created_at").or_insert(now);
            }
            Table::Sessions => {
                row.entry("created_at").or_insert(now);
            }
            Table::TestLogs => {
                row.entry("taken_at").or_insert(now);
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check_row(table: Table, row: &Row) -> Result<(), StoreError> {
    for column in row.keys() {
        table.check_column(column)?;
    }
    Ok(())
}

fn check_filter(table: Table, filter: &Filter) -> Result<(), StoreError> {
    for (column, _) in &filter.conditions {
        table.check_column(column)?;
    }
    Ok(())
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn insert(&self, table: Table, mut record: Row) -> Result<Row, StoreError> {
        if let Some(message) = lock(&self.insert_failure).clone() {
            return Err(StoreError::Backend(message));
        }
        check_row(table, &record)?;
        Self::apply_defaults(table, &mut record);

        let mut tables = lock(&self.tables);
        let rows = tables.entry(table).or_default();
        for column in Self::unique_columns(table) {
            let value = record.get(*column).unwrap_or(&Value::Null);
            if !value.is_null() && rows.iter().any(|r| r.get(*column) == Some(value)) {
                return Err(StoreError::Conflict(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    table.name(),
                    column
                )));
            }
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn select_one(&self, table: Table, filter: &Filter) -> Result<Option<Row>, StoreError> {
        check_filter(table, filter)?;
        let tables = lock(&self.tables);
        Ok(tables
            .get(&table)
            .and_then(|rows| rows.iter().find(|r| filter.matches(r)).cloned()))
    }

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<&Order>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        check_filter(table, filter)?;
        let mut rows: Vec<Row> = {
            let tables = lock(&self.tables);
            tables
                .get(&table)
                .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
                .unwrap_or_default()
        };

        if let Some(order) = order {
            let column = table.check_column(&order.column)?;
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(column).unwrap_or(&Value::Null),
                    b.get(column).unwrap_or(&Value::Null),
                );
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        check_filter(table, filter)?;
        check_row(table, &patch)?;
        let mut tables = lock(&self.tables);
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), StoreError> {
        check_filter(table, filter)?;
        let mut tables = lock(&self.tables);
        if let Some(rows) = tables.get_mut(&table) {
            rows.retain(|r| !filter.matches(r));
        }
        Ok(())
    }
}
