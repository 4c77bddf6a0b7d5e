// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{
        CreatePasswordRequest, IdentityClaim, LoginRequest, LoginResponse, LookupRequest, User,
    },
    state::AppState,
    store::{Filter, RemoteStore, Table, decode, encode},
    utils::{
        guard::{CurrentUser, LocalIdentity, open_session},
        password::{hash_password, verify_password},
    },
};

pub(crate) async fn find_user(
    store: &dyn RemoteStore,
    register_no: &str,
) -> Result<Option<User>, AppError> {
    let row = store
        .select_one(Table::Users, &Filter::new().eq("register_no", register_no.trim()))
        .await?;
    Ok(row.map(|r| decode(Table::Users, r)).transpose()?)
}

async fn issue_token(state: &AppState, user: &User) -> Result<LoginResponse, AppError> {
    let token = open_session(state.store.as_ref(), user, state.config.session_ttl_secs).await?;
    Ok(LoginResponse {
        token,
        token_type: "Bearer",
        user: IdentityClaim::from(user),
    })
}

/// First login step: tells the client whether to ask for a new password
/// or for the existing one.
pub async fn lookup(
    State(state): State<AppState>,
    Json(payload): Json<LookupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = find_user(state.store.as_ref(), &payload.register_no)
        .await?
        .ok_or_else(|| AppError::NotFound("Register number not found".to_string()))?;

    let step = if user.password.is_some() { "login" } else { "create" };
    Ok(Json(json!({
        "step": step,
        "student_name": user.student_name,
    })))
}

/// Sets the password of a provisioned student and logs them in.
pub async fn create_password(
    State(state): State<AppState>,
    Json(payload): Json<CreatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if payload.password != payload.confirm_password {
        return Err(AppError::BadRequest("Passwords do not match".to_string()));
    }

    let mut user = find_user(state.store.as_ref(), &payload.register_no)
        .await?
        .ok_or_else(|| AppError::NotFound("Register number not found".to_string()))?;
    if user.password.is_some() {
        return Err(AppError::Conflict("Password already set".to_string()));
    }

    let hashed_password = hash_password(&payload.password)?;
    state
        .store
        .update(
            Table::Users,
            &Filter::new().eq("id", user.id.to_string()),
            encode(Table::Users, &json!({ "password": hashed_password }))?,
        )
        .await?;
    user.password = Some(hashed_password);
    tracing::info!("Password created for {}", user.register_no);

    let response = issue_token(&state, &user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Authenticates a student and opens a session.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = find_user(state.store.as_ref(), &payload.register_no)
        .await?
        .ok_or(AppError::AuthError("Invalid register number or password".to_string()))?;

    let Some(stored) = user.password.as_deref() else {
        return Err(AppError::AuthError("Password not set".to_string()));
    };
    if !verify_password(&payload.password, stored) {
        tracing::warn!("Failed login for {}", user.register_no);
        return Err(AppError::AuthError(
            "Invalid register number or password".to_string(),
        ));
    }

    Ok(Json(issue_token(&state, &user).await?))
}

/// Deletes the caller's server session.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = LocalIdentity::from_headers(&headers).token {
        state
            .store
            .delete(Table::Sessions, &Filter::new().eq("token", token))
            .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's identity as the server knows it.
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(IdentityClaim::from(&user))
}
