// src/handlers/history.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    config::Config,
    error::AppError,
    exam::{review, view::SessionView},
    models::submission::{ExamStats, TestLogSummary, TestType},
    state::AppState,
    store::{Filter, Order, Table, decode},
    utils::guard::CurrentUser,
};

/// The caller's past attempts, newest first. The result also refreshes the
/// local history copy that later submissions update in place.
pub async fn list_history(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state
        .store
        .select_many(
            Table::TestLogs,
            &Filter::new().eq("user_id", user.id.to_string()),
            Some(&Order::desc("taken_at")),
            None,
        )
        .await?;

    let history = rows
        .into_iter()
        .map(|row| decode::<TestLogSummary>(Table::TestLogs, row))
        .collect::<Result<Vec<_>, _>>()?;

    state.hub.reconciler(user.id).remember_history(&history);
    Ok(Json(history))
}

/// Attempt count and best percentage per exam for the caller: the mock
/// exam first, then every configured practice set.
pub async fn profile_stats(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state
        .store
        .select_many(
            Table::TestLogs,
            &Filter::new().eq("user_id", user.id.to_string()),
            None,
            None,
        )
        .await?;

    let logs = rows
        .into_iter()
        .map(|row| decode::<TestLogSummary>(Table::TestLogs, row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(exam_stats(&state.config, &logs)))
}

fn exam_stats(config: &Config, logs: &[TestLogSummary]) -> Vec<ExamStats> {
    let mock = stats_for(
        "mock",
        &config.mock_test_name,
        logs.iter().filter(|log| log.test_type == TestType::Mock),
    );
    // Practice records carry the set's label as their test name.
    let practice = config.question_sets.iter().filter_map(|set| {
        let label = config.practice_label(set)?;
        Some(stats_for(
            set,
            &label,
            logs.iter()
                .filter(|log| log.test_type == TestType::Practice && log.test_name == label),
        ))
    });
    std::iter::once(mock).chain(practice).collect()
}

fn stats_for<'a>(
    key: &str,
    name: &str,
    entries: impl Iterator<Item = &'a TestLogSummary>,
) -> ExamStats {
    let mut attempts = 0;
    let mut best_percentage: Option<i32> = None;
    for entry in entries {
        attempts += 1;
        best_percentage = best_percentage.max(Some(entry.percentage));
    }
    ExamStats {
        key: key.to_string(),
        name: name.to_string(),
        attempts,
        best_percentage,
    }
}

/// Review of a stored attempt, rebuilt from its snapshot.
/// Records of other students are reported as missing unless the caller is an admin.
pub async fn get_review(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = review::fetch_record(state.store.as_ref(), &id).await?;
    if record.user_id != user.id && !user.is_admin {
        tracing::warn!("{} tried to open review {} of another user", user.id, id);
        return Err(AppError::NotFound(format!("record not found: {id}")));
    }

    let session = review::reconstruct(&record)?;
    Ok(Json(SessionView::build(
        &session,
        record.test_type.as_str(),
        &record.test_name,
        false,
        None,
    )))
}
