// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    exam::{hub::Action, view::SessionView},
    models::user::User,
    state::AppState,
    utils::guard::CurrentUser,
};

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub answer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub index: usize,
}

#[derive(Debug, Serialize)]
pub struct ExamSetInfo {
    pub id: String,
    pub name: String,
    pub timed: bool,
}

/// The mock exam followed by every configured practice set.
pub async fn list_sets(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    let mut sets = vec![ExamSetInfo {
        id: "mock".to_string(),
        name: config.mock_test_name.clone(),
        timed: true,
    }];
    sets.extend(config.question_sets.iter().map(|set| ExamSetInfo {
        id: set.clone(),
        name: config.practice_label(set).unwrap_or_else(|| set.clone()),
        timed: false,
    }));
    Json(sets)
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = state.hub.parse_kind(&kind)?;
    Ok(Json(state.hub.view(&user, &kind).await))
}

/// Loads the questions (on first start) and begins the attempt.
pub async fn start(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = state.hub.parse_kind(&kind)?;
    let view = state.hub.start(&user, &kind).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn act(
    state: &AppState,
    user: &User,
    kind: &str,
    action: Action,
) -> Result<Json<SessionView>, AppError> {
    let kind = state.hub.parse_kind(kind)?;
    Ok(Json(state.hub.act(user, &kind, action).await))
}

pub async fn select(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
    Json(payload): Json<SelectRequest>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, &user, &kind, Action::Select(payload.answer_id)).await
}

pub async fn save(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, &user, &kind, Action::Save).await
}

pub async fn clear(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, &user, &kind, Action::Clear).await
}

pub async fn navigate(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
    Json(payload): Json<NavigateRequest>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, &user, &kind, Action::Navigate(payload.index)).await
}

pub async fn next(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, &user, &kind, Action::Next).await
}

pub async fn previous(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    act(&state, &user, &kind, Action::Previous).await
}

/// Scores the attempt and saves it; the save outcome is in `save_status`.
pub async fn submit(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = state.hub.parse_kind(&kind)?;
    Ok(Json(state.hub.submit(&user, &kind).await?))
}

pub async fn review(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = state.hub.parse_kind(&kind)?;
    Ok(Json(state.hub.enter_review(&user, &kind).await?))
}

pub async fn retry_save(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = state.hub.parse_kind(&kind)?;
    Ok(Json(state.hub.retry_save(&user, &kind).await?))
}

pub async fn suspend(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = state.hub.parse_kind(&kind)?;
    state.hub.suspend(&user, &kind).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resume(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = state.hub.parse_kind(&kind)?;
    Ok(Json(state.hub.resume(&user, &kind).await))
}
