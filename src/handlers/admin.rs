// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        submission::{ResultsQuery, TestLogSummary},
        user::{CreateStudentRequest, User},
    },
    state::AppState,
    store::{Filter, Order, StoreError, Table, decode, encode},
};

const DEFAULT_RESULTS_LIMIT: usize = 200;
const MAX_RESULTS_LIMIT: usize = 1000;

/// Lists submitted results, newest first.
/// Admin only. Optional filters: `test_type`, `test_name`, `limit`.
pub async fn list_results(
    State(state): State<AppState>,
    Query(params): Query<ResultsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut filter = Filter::new();
    if let Some(test_type) = params.test_type {
        filter = filter.eq("test_type", test_type.as_str());
    }
    if let Some(test_name) = params.test_name.filter(|n| !n.is_empty()) {
        filter = filter.eq("test_name", test_name);
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RESULTS_LIMIT)
        .min(MAX_RESULTS_LIMIT);

    let rows = state
        .store
        .select_many(
            Table::TestLogs,
            &filter,
            Some(&Order::desc("taken_at")),
            Some(limit),
        )
        .await?;

    let results = rows
        .into_iter()
        .map(|row| decode::<TestLogSummary>(Table::TestLogs, row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(results))
}

/// Provisions a student by register number. The student sets a password
/// on first login.
/// Admin only.
pub async fn create_student(
    State(state): State<AppState>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let register_no = payload.register_no.trim().to_string();
    let row = encode(
        Table::Users,
        &json!({
            "register_no": register_no,
            "student_name": payload.student_name,
            "is_admin": payload.is_admin,
        }),
    )?;

    let inserted = state
        .store
        .insert(Table::Users, row)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                AppError::Conflict(format!("Register number '{}' already exists", register_no))
            }
            other => {
                tracing::error!("Failed to create student: {:?}", other);
                AppError::from(other)
            }
        })?;

    let user: User = decode(Table::Users, inserted)?;
    tracing::info!("Provisioned student {}", user.register_no);
    Ok((StatusCode::CREATED, Json(user)))
}
