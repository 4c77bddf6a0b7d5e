// src/store/postgres.rs

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _, types::Json};

use super::{Filter, Order, RemoteStore, Row, StoreError, Table};

/// `RemoteStore` over Postgres.
///
/// Rows travel as JSON objects: reads use `to_jsonb(t.*)`, writes go through
/// `jsonb_populate_record` so every value is cast to its column type by the
/// database. Column names are checked against [`Table::columns`] before they
/// are spliced into SQL; values are always bound.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_where(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: Table,
    filter: &Filter,
) -> Result<(), StoreError> {
    for (i, (column, value)) in filter.conditions.iter().enumerate() {
        let column = table.check_column(column)?;
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(format!("t.{column} IS NOT DISTINCT FROM (jsonb_populate_record(NULL::{}, ", table.name()));
        let mut probe = Row::new();
        probe.insert(column.to_string(), value.clone());
        qb.push_bind(Json(Value::Object(probe)));
        qb.push(format!(")).{column}"));
    }
    Ok(())
}

fn rows_from(records: Vec<sqlx::postgres::PgRow>, table: Table) -> Result<Vec<Row>, StoreError> {
    records
        .into_iter()
        .map(|r| {
            let Json(value): Json<Value> = r.try_get("row")?;
            match value {
                Value::Object(map) => Ok(map),
                _ => Err(StoreError::Malformed {
                    table: table.name(),
                    message: "row is not an object".to_string(),
                }),
            }
        })
        .collect()
}

fn checked_columns(table: Table, row: &Row) -> Result<Vec<&'static str>, StoreError> {
    row.keys().map(|k| table.check_column(k)).collect()
}

#[async_trait]
impl RemoteStore for PgStore {
    async fn insert(&self, table: Table, record: Row) -> Result<Row, StoreError> {
        let columns = checked_columns(table, &record)?;
        if columns.is_empty() {
            return Err(StoreError::Malformed {
                table: table.name(),
                message: "empty insert".to_string(),
            });
        }
        let list = columns.join(", ");

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {name} AS t ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{name}, ",
            name = table.name()
        ));
        qb.push_bind(Json(Value::Object(record)));
        qb.push(") RETURNING to_jsonb(t.*) AS row");

        let record = qb.build().fetch_one(&self.pool).await.map_err(|e| {
            tracing::error!("Insert into {} failed: {:?}", table.name(), e);
            StoreError::from(e)
        })?;
        rows_from(vec![record], table)?
            .pop()
            .ok_or_else(|| StoreError::Backend("insert returned no row".to_string()))
    }

    async fn select_one(&self, table: Table, filter: &Filter) -> Result<Option<Row>, StoreError> {
        Ok(self
            .select_many(table, filter, None, Some(1))
            .await?
            .into_iter()
            .next())
    }

    async fn select_many(
        &self,
        table: Table,
        filter: &Filter,
        order: Option<&Order>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT to_jsonb(t.*) AS row FROM {} AS t",
            table.name()
        ));
        push_where(&mut qb, table, filter)?;
        if let Some(order) = order {
            let column = table.check_column(&order.column)?;
            qb.push(format!(
                " ORDER BY t.{column} {}",
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }
        if let Some(limit) = limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let records = qb.build().fetch_all(&self.pool).await.map_err(|e| {
            tracing::error!("Select from {} failed: {:?}", table.name(), e);
            StoreError::from(e)
        })?;
        rows_from(records, table)
    }

    async fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        let columns = checked_columns(table, &patch)?;
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let assignments = columns
            .iter()
            .map(|c| format!("{c} = p.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "UPDATE {name} AS t SET {assignments} FROM jsonb_populate_record(NULL::{name}, ",
            name = table.name()
        ));
        qb.push_bind(Json(Value::Object(patch)));
        qb.push(") AS p");
        push_where(&mut qb, table, filter)?;
        qb.push(" RETURNING to_jsonb(t.*) AS row");

        let records = qb.build().fetch_all(&self.pool).await.map_err(|e| {
            tracing::error!("Update of {} failed: {:?}", table.name(), e);
            StoreError::from(e)
        })?;
        rows_from(records, table)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<(), StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("DELETE FROM {} AS t", table.name()));
        push_where(&mut qb, table, filter)?;
        qb.build().execute(&self.pool).await.map_err(|e| {
            tracing::error!("Delete from {} failed: {:?}", table.name(), e);
            StoreError::from(e)
        })?;
        Ok(())
    }
}
